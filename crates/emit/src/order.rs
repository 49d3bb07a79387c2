//! Block layout for bytecode emission.
//!
//! Layout rules imposed by the runtime dispatcher:
//!
//!   - The primary function body (everything outside fault funclets) comes
//!     first, with the main entry as the very first block.
//!   - Each fault funclet is contiguous, entry block first.
//!   - Default-value entry points go after the rest of the primary body; the
//!     normal shape is each DV initializer falling through to the next and
//!     the last jumping back to the main entry.

use vox_ir_data::{cfg, Block, BlockId, Bytecode, Func};

/// Order a function's blocks for emission.
pub(crate) fn order_blocks(func: &Func) -> Vec<BlockId> {
    let mut sorted = cfg::rpo_sort_from_main(func);

    // The DV-seeded order starts with the blocks only reachable from DV
    // entry points; everything from the main entry onward is already in
    // `sorted`.
    let dv_blocks = {
        let mut with_dvs = cfg::rpo_sort_add_dvs(func);
        let main_pos = with_dvs
            .iter()
            .position(|&b| b == sorted[0])
            .expect("main entry missing from DV-seeded order");
        with_dvs.truncate(main_pos);
        with_dvs
    };
    sorted.extend(dv_blocks);

    // Keeps blocks only reachable from DV entry points after all other main
    // code, and moves fault funclets after all that. Stable, so the RPO
    // order within each section is preserved.
    sorted.sort_by_key(|&b| func.blocks[b].section);

    sorted
}

/// A block consisting of exactly one plain `Nop`. When such a block leads
/// the layout it must be emitted as `EntryNop` instead: some jump targets the
/// block after it, and plain `Nop`s produce no bytes.
pub(crate) fn is_single_nop(block: &Block) -> bool {
    matches!(block.instrs.as_slice(), [instr] if matches!(instr.bc, Bytecode::Nop))
}
