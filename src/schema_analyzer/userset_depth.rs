//! Longest-chain measurement over the userset-pattern graph.
//!
//! Nodes are `(object_type, relation)` pairs; an edge points at the
//! target of a userset reference. The emitted SQL resolves one userset
//! hop per recursion level, so a chain longer than the resolution depth
//! cap can never complete — the planner turns those into `DepthExceeded`
//! stubs. Cycles (other than a self-loop, which the `SelfRefUserset`
//! strategy expands in SQL) make the chain unbounded.

use std::collections::BTreeMap;

pub type UsersetEdges = BTreeMap<(String, String), Vec<(String, String)>>;

/// Depth of the longest userset chain starting at `start`, counted in
/// hops. `usize::MAX` marks an unbounded (cyclic) chain.
pub fn max_userset_depth(start: &(String, String), edges: &UsersetEdges) -> usize {
    let mut memo: BTreeMap<(String, String), usize> = BTreeMap::new();
    let mut on_stack: Vec<(String, String)> = Vec::new();
    depth_of(start, edges, &mut memo, &mut on_stack)
}

fn depth_of(
    node: &(String, String),
    edges: &UsersetEdges,
    memo: &mut BTreeMap<(String, String), usize>,
    on_stack: &mut Vec<(String, String)>,
) -> usize {
    if let Some(&depth) = memo.get(node) {
        return depth;
    }
    if on_stack.contains(node) {
        return usize::MAX;
    }
    on_stack.push(node.clone());

    let mut best = 0usize;
    if let Some(children) = edges.get(node) {
        for child in children {
            // A self-loop is expanded in SQL by the SelfRefUserset
            // strategy; it does not contribute chain depth.
            if child == node {
                continue;
            }
            let child_depth = depth_of(child, edges, memo, on_stack);
            best = best.max(child_depth.saturating_add(1));
        }
    }

    on_stack.pop();
    memo.insert(node.clone(), best);
    best
}
