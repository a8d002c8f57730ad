//! Rewrite-tree walk collecting the per-relation feature surfaces.
//!
//! The walk separates *standalone* access surfaces (branches that grant
//! on their own: direct refs, implications, TTU edges reachable through
//! unions and exclusion bases) from intersection groups and exclusion
//! subtracts, which only constrain. Whole-tree complexity booleans are
//! tracked independently because closure partitioning looks through
//! every branch, standalone or not.

use crate::schema_catalog::{RewriteExpr, SubjectTypeRef};

#[derive(Debug, Clone, Default)]
pub struct LocalFeatures {
    /// Subject refs of standalone `Direct` branches (userset refs
    /// included), in declaration order.
    pub direct_refs: Vec<SubjectTypeRef>,
    /// Standalone implications, in declaration order.
    pub implied_relations: Vec<String>,
    /// Standalone `(tupleset, computed)` TTU edges, in declaration order.
    pub ttu_refs: Vec<(String, String)>,
    /// Raw children of each standalone intersection node.
    pub intersection_children: Vec<Vec<RewriteExpr>>,
    /// Subtract branches of exclusions, flattened to relation level.
    pub exclusion_subtracts: Vec<RewriteExpr>,

    pub contains_userset: bool,
    pub contains_ttu: bool,
    pub contains_intersection: bool,
    pub contains_exclusion: bool,
}

impl LocalFeatures {
    pub fn has_direct(&self) -> bool {
        !self.direct_refs.is_empty()
    }

    pub fn has_implied(&self) -> bool {
        !self.implied_relations.is_empty()
    }

    /// Non-userset subject types of the standalone direct refs (wildcard
    /// refs included), sorted and deduplicated.
    pub fn plain_subject_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .direct_refs
            .iter()
            .filter(|r| !r.is_userset())
            .map(|r| r.subject_type.clone())
            .collect();
        types.sort();
        types.dedup();
        types
    }

    /// `(subject_type, subject_relation)` of the standalone userset refs,
    /// in declaration order.
    pub fn userset_refs(&self) -> Vec<(String, String)> {
        self.direct_refs
            .iter()
            .filter_map(|r| {
                r.relation
                    .as_ref()
                    .map(|rel| (r.subject_type.clone(), rel.clone()))
            })
            .collect()
    }

    /// Whether a standalone direct ref admits the wildcard subject.
    pub fn has_wildcard(&self) -> bool {
        self.direct_refs.iter().any(|r| r.wildcard)
    }

    /// Anything beyond direct/implication anywhere in the tree. Complex
    /// members of a closure cannot be answered by tuple lookup.
    pub fn is_complex(&self) -> bool {
        self.contains_userset
            || self.contains_ttu
            || self.contains_intersection
            || self.contains_exclusion
    }
}

pub fn walk_rewrite(rewrite: &RewriteExpr) -> LocalFeatures {
    let mut features = LocalFeatures::default();
    walk(rewrite, &mut features);
    features
}

fn walk(rewrite: &RewriteExpr, features: &mut LocalFeatures) {
    match rewrite {
        RewriteExpr::Direct { subject_types } => {
            for subject_ref in subject_types {
                if subject_ref.is_userset() {
                    features.contains_userset = true;
                }
                features.direct_refs.push(subject_ref.clone());
            }
        }
        RewriteExpr::ComputedUserset { relation } => {
            features.implied_relations.push(relation.clone());
        }
        RewriteExpr::TupleToUserset { tupleset, computed } => {
            features.contains_ttu = true;
            features.ttu_refs.push((tupleset.clone(), computed.clone()));
        }
        RewriteExpr::Union { children } => {
            for child in children {
                walk(child, features);
            }
        }
        RewriteExpr::Intersection { children } => {
            features.contains_intersection = true;
            features.intersection_children.push(children.clone());
            for child in children {
                scan_flags(child, features);
            }
        }
        RewriteExpr::Exclusion { base, subtract } => {
            features.contains_exclusion = true;
            walk(base, features);
            features.exclusion_subtracts.push(subtract.as_ref().clone());
            scan_flags(subtract, features);
        }
    }
}

/// Record complexity booleans without contributing standalone surfaces.
fn scan_flags(rewrite: &RewriteExpr, features: &mut LocalFeatures) {
    match rewrite {
        RewriteExpr::Direct { subject_types } => {
            if subject_types.iter().any(|r| r.is_userset()) {
                features.contains_userset = true;
            }
        }
        RewriteExpr::ComputedUserset { .. } => {}
        RewriteExpr::TupleToUserset { .. } => {
            features.contains_ttu = true;
        }
        RewriteExpr::Union { children } | RewriteExpr::Intersection { children } => {
            if matches!(rewrite, RewriteExpr::Intersection { .. }) {
                features.contains_intersection = true;
            }
            for child in children {
                scan_flags(child, features);
            }
        }
        RewriteExpr::Exclusion { base, subtract } => {
            features.contains_exclusion = true;
            scan_flags(base, features);
            scan_flags(subtract, features);
        }
    }
}
