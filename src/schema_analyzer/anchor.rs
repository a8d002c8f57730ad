//! Indirect-anchor search for relations with no grant of their own.
//!
//! A relation like `viewer: viewer from parent` stores no tuples under
//! its own name; listing it means composing the list output of the
//! nearest relation that does have direct grants. The anchor path is the
//! shortest such route, found by BFS over TTU and userset edges.

use std::collections::{BTreeMap, VecDeque};

use super::analysis::{AnchorStep, AnchorStepKind};

/// Edges leaving one `(object_type, relation)` node, in declaration
/// order.
#[derive(Debug, Clone, Default)]
pub struct AnchorEdges {
    /// `(linking_relation, target_relation, target_types)`
    pub ttu: Vec<(String, String, Vec<String>)>,
    /// `(subject_type, subject_relation)`
    pub userset: Vec<(String, String)>,
}

pub type AnchorGraph = BTreeMap<(String, String), AnchorEdges>;

/// Shortest TTU/userset path from `start` to a relation whose closure
/// has direct grants. Empty when `start` grants directly or when no such
/// relation is reachable.
pub fn compute_indirect_anchor<F>(
    start: &(String, String),
    graph: &AnchorGraph,
    has_direct_grant: F,
) -> Vec<AnchorStep>
where
    F: Fn(&(String, String)) -> bool,
{
    if has_direct_grant(start) {
        return Vec::new();
    }

    // node -> (predecessor, step taken to reach it)
    let mut came_from: BTreeMap<(String, String), ((String, String), AnchorStep)> = BTreeMap::new();
    let mut queue: VecDeque<(String, String)> = VecDeque::new();
    queue.push_back(start.clone());

    while let Some(current) = queue.pop_front() {
        let Some(edges) = graph.get(&current) else {
            continue;
        };

        let mut neighbours: Vec<((String, String), AnchorStep)> = Vec::new();
        for (linking_relation, target_relation, target_types) in &edges.ttu {
            let step = AnchorStep {
                kind: AnchorStepKind::Ttu,
                via_relation: linking_relation.clone(),
                target_types: target_types.clone(),
                target_relation: target_relation.clone(),
            };
            for target_type in target_types {
                neighbours.push((
                    (target_type.clone(), target_relation.clone()),
                    step.clone(),
                ));
            }
        }
        for (subject_type, subject_relation) in &edges.userset {
            let step = AnchorStep {
                kind: AnchorStepKind::Userset,
                via_relation: subject_relation.clone(),
                target_types: vec![subject_type.clone()],
                target_relation: subject_relation.clone(),
            };
            neighbours.push(((subject_type.clone(), subject_relation.clone()), step));
        }

        for (neighbour, step) in neighbours {
            if neighbour == *start || came_from.contains_key(&neighbour) {
                continue;
            }
            came_from.insert(neighbour.clone(), (current.clone(), step));
            if has_direct_grant(&neighbour) {
                return reconstruct(start, &neighbour, &came_from);
            }
            queue.push_back(neighbour);
        }
    }

    Vec::new()
}

fn reconstruct(
    start: &(String, String),
    found: &(String, String),
    came_from: &BTreeMap<(String, String), ((String, String), AnchorStep)>,
) -> Vec<AnchorStep> {
    let mut path = Vec::new();
    let mut cursor = found.clone();
    while cursor != *start {
        let (previous, step) = came_from
            .get(&cursor)
            .expect("BFS predecessor chain is complete")
            .clone();
        path.push(step);
        cursor = previous;
    }
    path.reverse();
    path
}
