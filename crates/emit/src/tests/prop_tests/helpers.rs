//! Random-program generation for the emission property tests.
//!
//! Generated programs are always stack-disciplined: every gadget is
//! net-zero on the evaluation stack and every block boundary is crossed at
//! depth zero, so any emitted artifact can be checked structurally.

use proptest::prelude::*;

use vox_ir_data::builder::{FuncBuilder, UnitBuilder};
use vox_ir_data::{BlockId, Bytecode, ExnInfo, Func, Section, StrId, Unit};

#[derive(Debug, Clone)]
pub enum Gadget {
    IntPop(i64),
    AddPop(i64, i64),
    ConcatPop,
    CallPop,
    NestedCallPop,
    StringPop,
    DupExtraPop,
}

pub fn gadget_strategy() -> impl Strategy<Value = Gadget> {
    prop_oneof![
        any::<i64>().prop_map(Gadget::IntPop),
        (any::<i64>(), any::<i64>()).prop_map(|(a, b)| Gadget::AddPop(a, b)),
        Just(Gadget::ConcatPop),
        Just(Gadget::CallPop),
        Just(Gadget::NestedCallPop),
        Just(Gadget::StringPop),
        Just(Gadget::DupExtraPop),
    ]
}

#[derive(Debug, Clone)]
pub struct ProgramShape {
    /// Gadget lists, one per body block.
    pub blocks: Vec<Vec<Gadget>>,
    /// Optional forward conditional branch distance per non-final block.
    pub branches: Vec<Option<usize>>,
    /// Optional catch region over a run of body blocks.
    pub region: Option<(usize, usize)>,
    /// Nest a fault region inside the catch region when it is wide enough.
    pub nested: bool,
}

pub fn shape_strategy() -> impl Strategy<Value = ProgramShape> {
    (1usize..6)
        .prop_flat_map(|n| {
            (
                prop::collection::vec(prop::collection::vec(gadget_strategy(), 0..4), n),
                prop::collection::vec(prop::option::of(1usize..4), n - 1),
                prop::option::of((0..n, 1..=n)),
                any::<bool>(),
            )
        })
        .prop_map(|(blocks, branches, region, nested)| {
            let n = blocks.len();
            let region = region.and_then(|(lo, len)| {
                let hi = (lo + len).min(n);
                (hi > lo).then_some((lo, hi))
            });
            ProgramShape { blocks, branches, region, nested }
        })
}

fn push_gadget(fb: &mut FuncBuilder, bid: BlockId, g: &Gadget, s_callee: StrId, s_lit: StrId) {
    match g {
        Gadget::IntPop(v) => {
            fb.push_instr(bid, Bytecode::Int { val: *v });
            fb.push_instr(bid, Bytecode::PopC);
        }
        Gadget::AddPop(a, b) => {
            fb.push_instr(bid, Bytecode::Int { val: *a });
            fb.push_instr(bid, Bytecode::Int { val: *b });
            fb.push_instr(bid, Bytecode::Add);
            fb.push_instr(bid, Bytecode::PopC);
        }
        Gadget::ConcatPop => {
            fb.push_instr(bid, Bytecode::String { id: s_lit });
            fb.push_instr(bid, Bytecode::String { id: s_lit });
            fb.push_instr(bid, Bytecode::Concat);
            fb.push_instr(bid, Bytecode::PopC);
        }
        Gadget::CallPop => {
            fb.push_instr(bid, Bytecode::FPushFuncD { num_args: 0, func: s_callee });
            fb.push_instr(bid, Bytecode::FCall { num_args: 0 });
            fb.push_instr(bid, Bytecode::PopC);
        }
        Gadget::NestedCallPop => {
            fb.push_instr(bid, Bytecode::FPushFuncD { num_args: 1, func: s_callee });
            fb.push_instr(bid, Bytecode::FPushFuncD { num_args: 0, func: s_callee });
            fb.push_instr(bid, Bytecode::FCall { num_args: 0 });
            fb.push_instr(bid, Bytecode::FCall { num_args: 1 });
            fb.push_instr(bid, Bytecode::PopC);
        }
        Gadget::StringPop => {
            fb.push_instr(bid, Bytecode::String { id: s_lit });
            fb.push_instr(bid, Bytecode::PopC);
        }
        Gadget::DupExtraPop => {
            fb.push_instr(bid, Bytecode::Int { val: 7 });
            fb.push_instr(bid, Bytecode::Dup);
            fb.push_instr(bid, Bytecode::PopC);
            fb.push_instr(bid, Bytecode::PopC);
        }
    }
}

pub fn build_program(shape: &ProgramShape) -> (Unit, Func) {
    let mut ub = UnitBuilder::new("prop.php");
    let s_callee = ub.litstr("callee");
    let s_lit = ub.litstr("lit");

    let mut fb = FuncBuilder::new("f");
    let n = shape.blocks.len();
    let bids: Vec<BlockId> = (0..n + 1).map(|_| fb.block()).collect();
    let exit = bids[n];

    for (i, gadgets) in shape.blocks.iter().enumerate() {
        let bid = bids[i];
        for g in gadgets {
            push_gadget(&mut fb, bid, g, s_callee, s_lit);
        }
        if let Some(Some(dist)) = shape.branches.get(i) {
            let target = bids[(i + dist).min(n)];
            fb.push_instr(bid, Bytecode::Int { val: 1 });
            fb.push_instr(bid, Bytecode::JmpZ { target });
        }
        fb.set_fallthrough(bid, bids[i + 1]);
    }
    fb.push_instr(exit, Bytecode::Int { val: 0 });
    fb.push_instr(exit, Bytecode::RetC);

    if let Some((lo, hi)) = shape.region {
        let handler = fb.block();
        let outer = fb.add_exn_node(
            None,
            ExnInfo::Catch { catch_entry: handler, iter_id: None, it_ref: false },
        );
        for &bid in &bids[lo..hi] {
            fb.set_exn_node(bid, outer);
        }
        fb.add_factored_exit(bids[lo], handler);
        fb.push_instr(handler, Bytecode::Catch);
        fb.push_instr(handler, Bytecode::Throw);

        if shape.nested && hi - lo >= 2 {
            let funclet = fb.block();
            let inner = fb.add_exn_node(
                Some(outer),
                ExnInfo::Fault { fault_entry: funclet, iter_id: None, it_ref: false },
            );
            for &bid in &bids[lo..hi - 1] {
                fb.set_exn_node(bid, inner);
            }
            fb.add_factored_exit(bids[lo], funclet);
            fb.push_instr(funclet, Bytecode::Unwind);
            fb.set_section(funclet, Section::Fault);
        }
    }

    (ub.build(), fb.build())
}
