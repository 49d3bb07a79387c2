//! Control-flow traversal over a function's block graph.

use crate::index::{BlockId, IndexVec};
use crate::Func;

/// Visit every successor of `bid`: explicit branch targets, factored
/// (exceptional) exits, then the fall-through edge. Exceptional edges come
/// before the fall-through so a depth-first walk finishes handler blocks
/// early, which lays them out after the normal fall-through chain.
pub fn for_each_successor(func: &Func, bid: BlockId, mut f: impl FnMut(BlockId)) {
    let b = &func.blocks[bid];
    for instr in &b.instrs {
        instr.bc.for_each_target(&mut f);
    }
    for &t in &b.factored_exits {
        f(t);
    }
    if let Some(ft) = b.fallthrough {
        f(ft);
    }
}

/// Depth-first postorder from `seed`, appending finished blocks to `out`.
///
/// Iterative with an explicit frame stack so pathological block chains can't
/// overflow the call stack.
fn postorder_walk(
    func: &Func,
    seed: BlockId,
    visited: &mut IndexVec<BlockId, bool>,
    out: &mut Vec<BlockId>,
) {
    if visited[seed] {
        return;
    }
    visited[seed] = true;

    let successors = |bid: BlockId| {
        let mut succs = Vec::new();
        for_each_successor(func, bid, |s| succs.push(s));
        succs
    };

    let mut stack: Vec<(BlockId, Vec<BlockId>, usize)> = vec![(seed, successors(seed), 0)];
    while let Some(frame) = stack.last_mut() {
        let (bid, succs, next) = (frame.0, &frame.1, &mut frame.2);
        if *next < succs.len() {
            let succ = succs[*next];
            *next += 1;
            if !visited[succ] {
                visited[succ] = true;
                stack.push((succ, successors(succ), 0));
            }
        } else {
            out.push(bid);
            stack.pop();
        }
    }
}

/// Reverse postorder over everything reachable from the main entry. The main
/// entry is always first.
pub fn rpo_sort_from_main(func: &Func) -> Vec<BlockId> {
    let mut visited = IndexVec::from_vec(vec![false; func.blocks.len()]);
    let mut order = Vec::with_capacity(func.blocks.len());
    postorder_walk(func, func.main_entry, &mut visited, &mut order);
    order.reverse();
    order
}

/// Reverse postorder seeded with every default-value entry point (in
/// parameter order) and then the main entry, sharing one visited set.
pub fn rpo_sort_add_dvs(func: &Func) -> Vec<BlockId> {
    let mut visited = IndexVec::from_vec(vec![false; func.blocks.len()]);
    let mut order = Vec::with_capacity(func.blocks.len());
    for param in &func.params {
        if let Some(dv) = param.dv_entry_point {
            postorder_walk(func, dv, &mut visited, &mut order);
        }
    }
    postorder_walk(func, func.main_entry, &mut visited, &mut order);
    order.reverse();
    order
}
