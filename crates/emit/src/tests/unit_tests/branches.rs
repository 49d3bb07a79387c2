//! Branch serialization, back-patching and entry-depth bookkeeping.

use vox_ir_data::builder::{FuncBuilder, UnitBuilder};
use vox_ir_data::Bytecode;
use vox_unit::stream::read_int32;

use crate::tests::helpers::*;

#[test]
fn forward_branch_is_back_patched() {
    // Block 0 ends with JmpZ -> 2; block 1 is next; block 2 follows. The
    // patched immediate is relative to the JmpZ opcode byte.
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    fb.push_instr(b0, Bytecode::Int { val: 1 });
    fb.push_instr(b0, Bytecode::JmpZ { target: b2 });
    fb.set_fallthrough(b0, b1);
    fb.push_instr(b1, Bytecode::Int { val: 9 });
    fb.push_instr(b1, Bytecode::PopC);
    fb.set_fallthrough(b1, b2);
    ret_int(&mut fb, b2, 3);

    let solo = emit_solo(&unit, &fb.build());
    let jmp_at = INT_SIZE;
    let (rel, _) = read_int32(solo.bc(), jmp_at as usize + 1);
    assert_eq!(rel as u32, solo.block_offset(b2) - jmp_at);
    assert_eq!(branch_refs(solo.bc()), vec![(jmp_at, solo.block_offset(b2) as i64)]);
}

#[test]
fn backward_branch_is_emitted_directly() {
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    fb.push_instr(b0, Bytecode::Int { val: 1 });
    fb.push_instr(b0, Bytecode::PopC);
    fb.set_fallthrough(b0, b1);
    fb.push_instr(b1, Bytecode::Int { val: 5 });
    fb.push_instr(b1, Bytecode::JmpNZ { target: b1 });
    fb.set_fallthrough(b1, b2);
    ret_int(&mut fb, b2, 0);

    let solo = emit_solo(&unit, &fb.build());
    let jmp_at = solo.block_offset(b1) + INT_SIZE;
    let (rel, _) = read_int32(solo.bc(), jmp_at as usize + 1);
    assert!(rel < 0);
    assert_eq!(jmp_at as i64 + rel as i64, solo.block_offset(b1) as i64);
}

#[test]
fn fallthrough_to_non_adjacent_block_synthesizes_a_jmp() {
    // Diamond: block 1's fall-through target is laid out two blocks later.
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    let b3 = fb.block();
    fb.push_instr(b0, Bytecode::Int { val: 1 });
    fb.push_instr(b0, Bytecode::JmpZ { target: b2 });
    fb.set_fallthrough(b0, b1);
    fb.push_instr(b1, Bytecode::Int { val: 2 });
    fb.push_instr(b1, Bytecode::PopC);
    fb.set_fallthrough(b1, b3);
    fb.push_instr(b2, Bytecode::Int { val: 3 });
    fb.push_instr(b2, Bytecode::PopC);
    fb.set_fallthrough(b2, b3);
    ret_int(&mut fb, b3, 0);

    let solo = emit_solo(&unit, &fb.build());
    use vox_ir_data::Op;
    assert_eq!(
        ops_of(solo.bc()),
        vec![
            Op::Int,
            Op::JmpZ,
            Op::Int,
            Op::PopC,
            Op::Jmp,
            Op::Int,
            Op::PopC,
            Op::Int,
            Op::RetC
        ]
    );

    // The synthesized jump sits after block 1's recorded end.
    let jmp_at = solo.block_past(b1);
    assert_eq!(jmp_at, solo.block_offset(b1) + INT_SIZE + POP_C_SIZE);
    assert_eq!(solo.block_offset(b2), jmp_at + JMP_SIZE);
    let refs = branch_refs(solo.bc());
    assert!(refs.contains(&(jmp_at, solo.block_offset(b3) as i64)));
}

#[test]
fn no_surprise_fallthrough_synthesizes_jmp_ns() {
    // Same diamond as above, but block 1's fall-through edge skips the
    // surprise check.
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    let b3 = fb.block();
    fb.push_instr(b0, Bytecode::Int { val: 1 });
    fb.push_instr(b0, Bytecode::JmpZ { target: b2 });
    fb.set_fallthrough(b0, b1);
    fb.push_instr(b1, Bytecode::Int { val: 2 });
    fb.push_instr(b1, Bytecode::PopC);
    fb.set_fallthrough_ns(b1, b3);
    fb.push_instr(b2, Bytecode::Int { val: 3 });
    fb.push_instr(b2, Bytecode::PopC);
    fb.set_fallthrough(b2, b3);
    ret_int(&mut fb, b3, 0);

    let solo = emit_solo(&unit, &fb.build());
    use vox_ir_data::Op;
    let ops = ops_of(solo.bc());
    assert!(ops.contains(&Op::JmpNS));
    assert!(!ops.contains(&Op::Jmp));
    assert_eq!(solo.bc()[solo.block_past(b1) as usize], Op::JmpNS as u8);
}

#[test]
fn switch_targets_all_patch() {
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    fb.push_instr(b0, Bytecode::Int { val: 0 });
    fb.push_instr(b0, Bytecode::Switch { targets: vec![b1, b2] });
    ret_int(&mut fb, b1, 1);
    ret_int(&mut fb, b2, 2);

    let solo = emit_solo(&unit, &fb.build());
    let refs = branch_refs(solo.bc());
    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].0, INT_SIZE);
    assert_eq!(refs[0].1, solo.block_offset(b1) as i64);
    assert_eq!(refs[1].1, solo.block_offset(b2) as i64);
}

#[test]
fn string_switch_keeps_sentinel_before_default() {
    let mut ub = UnitBuilder::new("a.php");
    let s_a = ub.litstr("alpha");
    let s_def = ub.litstr("unused-default-label");
    let unit = ub.build();

    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    fb.push_instr(b0, Bytecode::Int { val: 0 });
    fb.push_instr(b0, Bytecode::SSwitch { cases: vec![(s_a, b1), (s_def, b2)] });
    ret_int(&mut fb, b1, 1);
    ret_int(&mut fb, b2, 2);

    let solo = emit_solo(&unit, &fb.build());
    let base = INT_SIZE as usize + 1;
    let (n, pos) = read_int32(solo.bc(), base);
    assert_eq!(n, 2);
    let (label, pos) = read_int32(solo.bc(), pos);
    assert_eq!(label, 0, "first case label is the first interned litstr");
    let (_, pos) = read_int32(solo.bc(), pos);
    let (sentinel, pos) = read_int32(solo.bc(), pos);
    assert_eq!(sentinel, -1);
    let (rel, _) = read_int32(solo.bc(), pos);
    assert_eq!(INT_SIZE as i64 + rel as i64, solo.block_offset(b2) as i64);
}

#[test]
fn single_case_string_switch_still_has_sentinel() {
    let mut ub = UnitBuilder::new("a.php");
    let s = ub.litstr("only");
    let unit = ub.build();

    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    let b1 = fb.block();
    fb.push_instr(b0, Bytecode::Int { val: 0 });
    fb.push_instr(b0, Bytecode::SSwitch { cases: vec![(s, b1)] });
    ret_int(&mut fb, b1, 1);

    let solo = emit_solo(&unit, &fb.build());
    let base = INT_SIZE as usize + 1;
    let (n, pos) = read_int32(solo.bc(), base);
    assert_eq!(n, 1);
    let (sentinel, _) = read_int32(solo.bc(), pos);
    assert_eq!(sentinel, -1);
}

#[test]
#[should_panic(expected = "stack depth mismatch")]
fn conflicting_entry_depths_abort() {
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    fb.push_instr(b0, Bytecode::Int { val: 1 });
    fb.push_instr(b0, Bytecode::JmpZ { target: b2 });
    fb.set_fallthrough(b0, b1);
    // Falls through to b2 with one extra value on the stack.
    fb.push_instr(b1, Bytecode::Int { val: 7 });
    fb.set_fallthrough(b1, b2);
    ret_int(&mut fb, b2, 0);

    emit_solo(&unit, &fb.build());
}

#[test]
#[should_panic(expected = "stack depth != 1")]
fn return_requires_exactly_one_value() {
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    fb.push_instr(b0, Bytecode::RetC);
    emit_solo(&unit, &fb.build());
}

#[test]
#[should_panic(expected = "stack underflow")]
fn popping_an_empty_stack_aborts() {
    let unit = UnitBuilder::new("a.php").build();
    let mut fb = FuncBuilder::new("f");
    let b0 = fb.block();
    fb.push_instr(b0, Bytecode::PopC);
    fb.push_instr(b0, Bytecode::Int { val: 0 });
    fb.push_instr(b0, Bytecode::RetC);
    emit_solo(&unit, &fb.build());
}
