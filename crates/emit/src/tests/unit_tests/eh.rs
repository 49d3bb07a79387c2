//! Exception-region flattening over the finished layout.

use vox_ir_data::builder::{FuncBuilder, UnitBuilder};
use vox_ir_data::{Bytecode, ExnInfo, Section};
use vox_unit::EhKind;

use crate::tests::helpers::*;

#[test]
fn single_catch_region() {
    // Blocks 0 and 1 sit inside catch node N; block 2 is outside; block 3
    // is the handler. One Catch row spanning [block0, block2).
    let mut ub = UnitBuilder::new("a.php");
    let s_f = ub.litstr("may_throw");
    let unit = ub.build();

    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    let b3 = fb.block();
    let n = fb.add_exn_node(
        None,
        ExnInfo::Catch { catch_entry: b3, iter_id: None, it_ref: false },
    );

    fb.push_instr(b0, Bytecode::FPushFuncD { num_args: 0, func: s_f });
    fb.push_instr(b0, Bytecode::FCall { num_args: 0 });
    fb.push_instr(b0, Bytecode::PopC);
    fb.set_exn_node(b0, n);
    fb.add_factored_exit(b0, b3);
    fb.set_fallthrough(b0, b1);

    fb.push_instr(b1, Bytecode::Int { val: 1 });
    fb.push_instr(b1, Bytecode::PopC);
    fb.set_exn_node(b1, n);
    fb.set_fallthrough(b1, b2);

    ret_int(&mut fb, b2, 0);

    fb.push_instr(b3, Bytecode::Catch);
    fb.push_instr(b3, Bytecode::Throw);

    let solo = emit_solo(&unit, &fb.build());
    assert_eq!(
        solo.info.block_order,
        vec![b0, b1, b2, b3],
        "handler should lay out after the covered code"
    );
    assert_eq!(solo.fe.ehtab.len(), 1);
    let eh = &solo.fe.ehtab[0];
    assert_eq!(eh.kind, EhKind::Catch);
    assert_eq!(eh.base, solo.block_offset(b0));
    assert_eq!(eh.past, solo.block_offset(b2));
    assert_eq!(eh.handler, solo.block_offset(b3));
    assert_eq!(eh.parent_index, -1);
    assert_eq!(eh.iter_id, None);
    assert!(solo.fe.eh_tab_is_sorted());
}

#[test]
fn nested_regions_emit_parent_first() {
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let a = fb.block();
    let b = fb.block();
    let c = fb.block();
    let d = fb.block();
    let h_catch = fb.block();
    let h_fault = fb.block();

    let outer = fb.add_exn_node(
        None,
        ExnInfo::Catch { catch_entry: h_catch, iter_id: None, it_ref: false },
    );
    let inner = fb.add_exn_node(
        Some(outer),
        ExnInfo::Fault { fault_entry: h_fault, iter_id: None, it_ref: false },
    );

    for (bid, node) in [(a, outer), (b, inner), (c, outer)] {
        fb.push_instr(bid, Bytecode::Int { val: 1 });
        fb.push_instr(bid, Bytecode::PopC);
        fb.set_exn_node(bid, node);
    }
    fb.add_factored_exit(a, h_catch);
    fb.add_factored_exit(b, h_fault);
    fb.set_fallthrough(a, b);
    fb.set_fallthrough(b, c);
    fb.set_fallthrough(c, d);
    ret_int(&mut fb, d, 0);

    fb.push_instr(h_catch, Bytecode::Catch);
    fb.push_instr(h_catch, Bytecode::Throw);
    fb.push_instr(h_fault, Bytecode::Unwind);
    fb.set_section(h_fault, Section::Fault);

    let solo = emit_solo(&unit, &fb.build());
    assert_eq!(solo.fe.ehtab.len(), 2);

    let parent = &solo.fe.ehtab[0];
    let child = &solo.fe.ehtab[1];
    assert_eq!(parent.kind, EhKind::Catch);
    assert_eq!(parent.base, solo.block_offset(a));
    assert_eq!(parent.past, solo.block_offset(d));
    assert_eq!(parent.handler, solo.block_offset(h_catch));
    assert_eq!(parent.parent_index, -1);

    assert_eq!(child.kind, EhKind::Fault);
    assert_eq!(child.base, solo.block_offset(b));
    assert_eq!(child.past, solo.block_offset(c));
    assert_eq!(child.handler, solo.block_offset(h_fault));
    assert_eq!(child.parent_index, 0);

    // Parent encloses child.
    assert!(parent.base <= child.base && child.past <= parent.past);
}

#[test]
fn jump_out_of_a_fault_region_ends_it_at_block_past() {
    // m0 sits in fault region F and falls through to m1, which lays out
    // after m2; the synthesized jump leaves the region, so the region ends
    // at m0's own past, not at the jump.
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let m0 = fb.block();
    let m1 = fb.block();
    let m2 = fb.block();
    let hf = fb.block();

    let f_node = fb.add_exn_node(
        None,
        ExnInfo::Fault { fault_entry: hf, iter_id: None, it_ref: false },
    );

    fb.push_instr(m0, Bytecode::Int { val: 1 });
    fb.push_instr(m0, Bytecode::JmpZ { target: m2 });
    fb.set_exn_node(m0, f_node);
    fb.add_factored_exit(m0, hf);
    fb.set_fallthrough(m0, m1);

    fb.push_instr(m2, Bytecode::Int { val: 1 });
    fb.push_instr(m2, Bytecode::PopC);
    fb.set_fallthrough(m2, m1);

    ret_int(&mut fb, m1, 2);

    fb.push_instr(hf, Bytecode::Unwind);
    fb.set_section(hf, Section::Fault);

    let solo = emit_solo(&unit, &fb.build());
    assert_eq!(solo.info.block_order, vec![m0, m2, m1, hf]);
    assert_eq!(solo.info.block_info[m0].regions_to_pop, 1);

    assert_eq!(solo.fe.ehtab.len(), 1);
    let eh = &solo.fe.ehtab[0];
    assert_eq!(eh.kind, EhKind::Fault);
    assert_eq!(eh.base, solo.block_offset(m0));
    assert_eq!(eh.past, solo.block_past(m0));
    // The synthesized jump lies outside the region.
    assert!(solo.block_offset(m2) > eh.past);
    assert_eq!(eh.handler, solo.block_offset(hf));
}

#[test]
fn empty_region_rows_are_skipped() {
    // A region whose only block serializes to zero bytes produces no row.
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    let h = fb.block();
    let n = fb.add_exn_node(
        None,
        ExnInfo::Catch { catch_entry: h, iter_id: None, it_ref: false },
    );

    fb.push_instr(b0, Bytecode::Int { val: 1 });
    fb.push_instr(b0, Bytecode::PopC);
    fb.set_fallthrough(b0, b1);
    fb.push_instr(b1, Bytecode::Nop);
    fb.set_exn_node(b1, n);
    fb.add_factored_exit(b1, h);
    fb.set_fallthrough(b1, b2);
    ret_int(&mut fb, b2, 0);
    fb.push_instr(h, Bytecode::Catch);
    fb.push_instr(h, Bytecode::Throw);

    let solo = emit_solo(&unit, &fb.build());
    assert_eq!(solo.block_offset(b1), solo.block_past(b1));
    assert!(solo.fe.ehtab.is_empty());
    assert!(solo.fe.eh_tab_is_sorted());
}

#[test]
fn disjoint_intervals_for_one_node_coalesce_per_run() {
    // The same node covers two runs of blocks separated by uncovered code:
    // two rows, one per contiguous run.
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let a = fb.block();
    let gap = fb.block();
    let b = fb.block();
    let tail = fb.block();
    let h = fb.block();
    let n = fb.add_exn_node(
        None,
        ExnInfo::Catch { catch_entry: h, iter_id: None, it_ref: false },
    );

    fb.push_instr(a, Bytecode::Int { val: 1 });
    fb.push_instr(a, Bytecode::PopC);
    fb.set_exn_node(a, n);
    fb.add_factored_exit(a, h);
    fb.set_fallthrough(a, gap);

    fb.push_instr(gap, Bytecode::Int { val: 2 });
    fb.push_instr(gap, Bytecode::PopC);
    fb.set_fallthrough(gap, b);

    fb.push_instr(b, Bytecode::Int { val: 3 });
    fb.push_instr(b, Bytecode::PopC);
    fb.set_exn_node(b, n);
    fb.set_fallthrough(b, tail);

    ret_int(&mut fb, tail, 0);

    fb.push_instr(h, Bytecode::Catch);
    fb.push_instr(h, Bytecode::Throw);

    let solo = emit_solo(&unit, &fb.build());
    assert_eq!(solo.fe.ehtab.len(), 2);
    assert_eq!(solo.fe.ehtab[0].base, solo.block_offset(a));
    assert_eq!(solo.fe.ehtab[0].past, solo.block_offset(gap));
    assert_eq!(solo.fe.ehtab[1].base, solo.block_offset(b));
    assert_eq!(solo.fe.ehtab[1].past, solo.block_offset(tail));
    assert_eq!(solo.fe.ehtab[0].handler, solo.fe.ehtab[1].handler);
}
