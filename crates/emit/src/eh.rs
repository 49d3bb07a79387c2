//! Flattening the exception-node tree into the runtime EH table.
//!
//! Block layout was not constrained by the exception tree, but adjacent
//! blocks are still likely to share an exception node, so regions are
//! coalesced while walking the layout. Regions live in one flat vector with
//! parent links by index; nothing here owns a cycle.

use smallvec::SmallVec;
use std::collections::HashMap;

use vox_ir_data::{ExnInfo, ExnNodeId, Func};
use vox_unit::{EhEnt, EhKind, FuncEmitter, Offset, INVALID_OFFSET};

use crate::bc::EmitBcInfo;

/// Two nodes dispatch to the same runtime handler chain: equal depth and
/// equal handler entry at every ancestor step until both run out.
pub(crate) fn handle_equivalent(
    func: &Func,
    mut a: Option<ExnNodeId>,
    mut b: Option<ExnNodeId>,
) -> bool {
    loop {
        match (a, b) {
            (None, None) => return true,
            (Some(x), Some(y)) => {
                let (nx, ny) = (&func.exn_nodes[x], &func.exn_nodes[y]);
                if nx.depth != ny.depth || nx.entry_block() != ny.entry_block() {
                    return false;
                }
                a = nx.parent;
                b = ny.parent;
            }
            _ => return false,
        }
    }
}

/// The deepest region both `a` and `b` are handle-equivalent to a child of.
pub(crate) fn common_parent(
    func: &Func,
    mut a: Option<ExnNodeId>,
    mut b: Option<ExnNodeId>,
) -> Option<ExnNodeId> {
    if a.is_none() || b.is_none() {
        return None;
    }
    let depth = |n: Option<ExnNodeId>| n.map_or(0, |n| func.exn_nodes[n].depth);
    let parent = |n: Option<ExnNodeId>| n.and_then(|n| func.exn_nodes[n].parent);
    while depth(a) > depth(b) {
        a = parent(a);
    }
    while depth(b) > depth(a) {
        b = parent(b);
    }
    while !handle_equivalent(func, a, b) {
        a = parent(a);
        b = parent(b);
    }
    a
}

/// The root-to-node path.
fn exn_path(func: &Func, node: ExnNodeId) -> SmallVec<[ExnNodeId; 8]> {
    let mut path = SmallVec::new();
    let mut cur = Some(node);
    while let Some(n) = cur {
        path.push(n);
        cur = func.exn_nodes[n].parent;
    }
    path.reverse();
    path
}

fn shared_prefix(a: &[ExnNodeId], b: &[ExnNodeId]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// A byte interval attributed to one exception node. Parent is an index into
/// the flattener's region vector.
#[derive(Debug)]
struct EhRegion {
    node: ExnNodeId,
    parent: Option<usize>,
    start: Offset,
    past: Offset,
}

/// Walk the laid-out blocks, derive the interval of every exception region,
/// sort them the way the runtime wants, and append them to `fe`'s EH table.
pub(crate) fn emit_ehent_tree(fe: &mut FuncEmitter, func: &Func, info: &EmitBcInfo) {
    let mut regions: Vec<EhRegion> = Vec::new();
    // Most recent region opened for each node; a node can open several
    // disjoint regions over the layout.
    let mut latest: HashMap<ExnNodeId, usize> = HashMap::new();
    let mut active: Vec<ExnNodeId> = Vec::new();

    // Walking over the blocks in layout order, the active list holds the
    // exception path of the current block; divergence closes and opens
    // regions at block boundaries.
    for &bid in &info.block_order {
        let binfo = &info.block_info[bid];

        let Some(exn) = func.blocks[bid].exn_node else {
            while let Some(node) = active.pop() {
                regions[latest[&node]].past = binfo.offset;
            }
            continue;
        };

        let path = exn_path(func, exn);
        let prefix = shared_prefix(&path, &active);
        while active.len() > prefix {
            let node = active.pop().expect("active list shrank unexpectedly");
            regions[latest[&node]].past = binfo.offset;
        }
        for &node in &path[prefix..] {
            let parent = active.last().map(|top| latest[top]);
            latest.insert(node, regions.len());
            regions.push(EhRegion { node, parent, start: binfo.offset, past: INVALID_OFFSET });
            active.push(node);
        }

        // A jump out of a fault region at the end of this block ends every
        // region deeper than the jump target's.
        for _ in 0..binfo.regions_to_pop {
            let node = active.pop().expect("popping more fault regions than are active");
            regions[latest[&node]].past = binfo.past;
        }
    }

    if let Some(&last_bid) = info.block_order.last() {
        let end = info.block_info[last_bid].past;
        while let Some(node) = active.pop() {
            regions[latest[&node]].past = end;
        }
    }

    // Runtime order: starts ascending; ties enclose-first; exact overlaps
    // parent-first.
    let is_ancestor = |a: usize, b: usize| {
        let mut cur = regions[b].parent;
        while let Some(p) = cur {
            if p == a {
                return true;
            }
            cur = regions[p].parent;
        }
        false
    };
    let mut order: Vec<usize> = (0..regions.len()).collect();
    order.sort_by(|&a, &b| {
        use std::cmp::Ordering;
        let (ra, rb) = (&regions[a], &regions[b]);
        match ra.start.cmp(&rb.start) {
            Ordering::Equal => match rb.past.cmp(&ra.past) {
                Ordering::Equal => {
                    if a == b {
                        Ordering::Equal
                    } else if is_ancestor(a, b) {
                        Ordering::Less
                    } else {
                        // Exactly overlapping regions lie on one parent
                        // chain; anything else is a flattener bug.
                        debug_assert!(is_ancestor(b, a));
                        Ordering::Greater
                    }
                }
                other => other,
            },
            other => other,
        }
    });

    let mut eh_index: HashMap<usize, usize> = HashMap::new();
    for &r in &order {
        let region = &regions[r];

        // A region covering a single empty block spans no bytes.
        if region.start == region.past {
            continue;
        }
        assert!(
            region.start != INVALID_OFFSET && region.past != INVALID_OFFSET,
            "unclosed EH region in {func}"
        );
        assert!(region.past >= region.start);

        let parent_index = match region.parent {
            Some(p) => {
                let idx = *eh_index
                    .get(&p)
                    .expect("child EH region emitted before its parent");
                idx as i32
            }
            None => -1,
        };

        let node = &func.exn_nodes[region.node];
        let (kind, entry, iter_id, it_ref) = match node.info {
            ExnInfo::Catch { catch_entry, iter_id, it_ref } => {
                (EhKind::Catch, catch_entry, iter_id, it_ref)
            }
            ExnInfo::Fault { fault_entry, iter_id, it_ref } => {
                (EhKind::Fault, fault_entry, iter_id, it_ref)
            }
        };

        let idx = fe.add_eh_ent(EhEnt {
            kind,
            base: region.start,
            past: region.past,
            iter_id,
            it_ref,
            handler: info.block_info[entry].offset,
            end: INVALID_OFFSET,
            parent_index,
        });
        eh_index.insert(r, idx);
    }

    fe.set_eh_tab_is_sorted();
}
