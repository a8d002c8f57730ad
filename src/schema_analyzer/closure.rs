//! Satisfying-relation closure and its partition.
//!
//! `viewer: editor` means holding `editor` implies holding `viewer`, so
//! the closure of `viewer` contains `editor` and, transitively, whatever
//! grants `editor`. The closure is reachability over standalone
//! implication edges; a visited set absorbs cycles (`R → S → R`
//! terminates with both members present).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::feature_walk::LocalFeatures;

pub type RelationFeatures = BTreeMap<(String, String), LocalFeatures>;

/// All relations on `object_type` whose holders also hold `relation`,
/// self included. Sorted.
pub fn satisfying_relations(
    object_type: &str,
    relation: &str,
    locals: &RelationFeatures,
) -> Vec<String> {
    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    visited.insert(relation.to_string());
    queue.push_back(relation.to_string());

    while let Some(current) = queue.pop_front() {
        let key = (object_type.to_string(), current);
        if let Some(features) = locals.get(&key) {
            for implied in &features.implied_relations {
                if visited.insert(implied.clone()) {
                    queue.push_back(implied.clone());
                }
            }
        }
    }

    visited.into_iter().collect()
}

/// Closure members split by how the emitted SQL answers them. Self is
/// excluded from every list; the direct-lookup set re-adds it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClosurePartition {
    /// Pure direct/implication members: answerable by tuple lookup.
    pub simple: Vec<String>,
    /// Members needing a recursive permission call (userset, TTU or
    /// exclusion in their rewrite).
    pub complex: Vec<String>,
    /// Members whose rewrite contains an intersection.
    pub intersectional: Vec<String>,
}

pub fn partition_closure(
    object_type: &str,
    relation: &str,
    closure: &[String],
    locals: &RelationFeatures,
) -> ClosurePartition {
    let mut partition = ClosurePartition::default();
    for member in closure {
        if member == relation {
            continue;
        }
        let key = (object_type.to_string(), member.clone());
        let Some(features) = locals.get(&key) else {
            continue;
        };
        if features.contains_intersection {
            partition.intersectional.push(member.clone());
        } else if features.is_complex() {
            partition.complex.push(member.clone());
        } else {
            partition.simple.push(member.clone());
        }
    }
    partition
}
