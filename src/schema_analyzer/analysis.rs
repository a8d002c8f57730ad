//! Per-relation analysis records.
//!
//! A [`RelationAnalysis`] is produced once per `(object_type, relation)`
//! pair and is immutable afterwards; the planners read it, never amend
//! it.

use serde::{Deserialize, Serialize};

use crate::sql_ir::RelationKey;

/// How the list functions for a relation are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListStrategy {
    /// Plain tuple lookup over the direct-lookup relation set.
    Direct,
    /// Direct lookup plus userset-pattern expansion blocks.
    Userset,
    /// Recursive CTE over a self-referential tuple-to-userset link.
    Recursive,
    /// INTERSECT of per-part subqueries.
    Intersection,
    /// Userset chains exceed the resolution depth cap; emit a stub that
    /// raises `M2002`.
    DepthExceeded,
    /// Userset pattern pointing back at the relation itself; expansion
    /// CTE over the userset tuples.
    SelfRefUserset,
    /// No grant of its own; composes the anchor relation's list output.
    Composed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub check_allowed: bool,
    pub list_allowed: bool,
}

/// A `type#relation` subject reference admitted by a direct grant
/// somewhere in the closure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsersetPattern {
    pub subject_type: String,
    pub subject_relation: String,
    /// Closure of `(subject_type, subject_relation)`, sorted.
    pub satisfying_relations: Vec<String>,
    /// Whether that closure admits wildcard grants.
    pub has_wildcard: bool,
    /// Whether membership can only be decided by a recursive permission
    /// call (the target relation's closure carries complex features).
    pub is_complex: bool,
    /// The closure member whose rewrite contributed this pattern.
    pub source_relation: String,
}

impl UsersetPattern {
    /// Dedup/sort key. Patterns are unique per (subject_type,
    /// subject_relation); the first contributing source wins.
    pub fn key(&self) -> (String, String) {
        (self.subject_type.clone(), self.subject_relation.clone())
    }
}

/// A tuple-to-userset edge: holding `target_relation` on an object linked
/// through `linking_relation` grants the analysed relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentRelation {
    pub linking_relation: String,
    pub target_relation: String,
    /// Object types the linking relation can point at, sorted.
    pub target_types: Vec<String>,
    pub has_cross_type_link: bool,
    pub has_self_referential_link: bool,
}

/// One branch of a `but not` exclusion, classified by how the emitted SQL
/// must evaluate it. A relation's exclusion config is the disjunction of
/// its branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExclusionBranch {
    /// Pure tuple lookup over the excluded relation set.
    Simple {
        relations: Vec<String>,
        has_wildcard: bool,
    },
    /// Requires a recursive permission call.
    Complex { relation: String },
    /// Excluded when a linked parent grants the target relation.
    TupleToUserset(ParentRelation),
    /// Excluded when every part of the group holds.
    Intersection(IntersectionGroup),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExclusionConfig {
    pub branches: Vec<ExclusionBranch>,
}

impl ExclusionConfig {
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// True when every branch is a plain tuple lookup — the prerequisite
    /// for the CTE-based anti-join form.
    pub fn all_simple(&self) -> bool {
        self.branches
            .iter()
            .all(|b| matches!(b, ExclusionBranch::Simple { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntersectionPartKind {
    /// The relation's own direct grants (`this`).
    Direct {
        relations: Vec<String>,
        subject_types: Vec<String>,
        has_wildcard: bool,
    },
    ComputedUserset {
        relation: String,
        /// Direct-lookup set of the target when it is simple.
        satisfying_relations: Vec<String>,
        has_wildcard: bool,
        /// Target needs a recursive permission call.
        is_complex: bool,
    },
    TupleToUserset(ParentRelation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionPart {
    pub kind: IntersectionPartKind,
    /// Nested `but not` scoped to this part.
    pub but_not: Option<ExclusionConfig>,
}

/// Ordered parts of one intersection; a subject qualifies when every part
/// holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionGroup {
    pub parts: Vec<IntersectionPart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorStepKind {
    Ttu,
    Userset,
}

/// One hop of the indirect-anchor path from a grantless relation towards
/// the nearest relation with direct grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorStep {
    pub kind: AnchorStepKind,
    /// Linking relation (TTU) or the userset's subject relation.
    pub via_relation: String,
    /// Types the step lands on, sorted.
    pub target_types: Vec<String>,
    /// Relation evaluated on the target type.
    pub target_relation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationAnalysis {
    pub object_type: String,
    pub relation: String,

    pub has_direct: bool,
    pub has_implied: bool,
    pub has_wildcard: bool,
    pub has_userset: bool,
    pub has_ttu: bool,
    pub has_exclusion: bool,
    pub has_intersection: bool,
    /// A tuple-to-userset link whose targets include the relation's own
    /// type.
    pub has_recursive: bool,

    /// Closure members (excluding self) answerable by plain tuple lookup.
    pub simple_closure_relations: Vec<String>,
    /// Closure members (excluding self) needing a recursive check call.
    pub complex_closure_relations: Vec<String>,
    /// Closure members whose rewrite contains an intersection.
    pub intersection_closure_relations: Vec<String>,

    /// Subject types admitted by any plain direct grant in the closure.
    pub allowed_subject_types: Vec<String>,

    /// Whether any closure member (self included) has a direct grant,
    /// userset refs counted.
    pub closure_has_direct: bool,

    /// Userset patterns from this relation's own rewrite.
    pub userset_patterns: Vec<UsersetPattern>,
    /// Userset patterns contributed by the whole closure (self included).
    pub closure_userset_patterns: Vec<UsersetPattern>,

    pub parent_relations: Vec<ParentRelation>,
    pub intersection_groups: Vec<IntersectionGroup>,
    pub exclusions: ExclusionConfig,

    /// TTU/userset hops to the nearest relation with direct grants; empty
    /// when the relation grants directly (or nothing reaches a grant).
    pub indirect_anchor: Vec<AnchorStep>,

    /// Longest chain in the userset-pattern graph; `usize::MAX` marks an
    /// unbounded (cyclic) chain.
    pub max_userset_depth: usize,

    pub capabilities: Capabilities,
    pub list_strategy: ListStrategy,
}

impl RelationAnalysis {
    pub fn key(&self) -> RelationKey {
        RelationKey::new(self.object_type.clone(), self.relation.clone())
    }

    /// Relations a plain tuple lookup matches: self plus the simple
    /// closure, sorted and deduplicated.
    pub fn direct_lookup_relations(&self) -> Vec<String> {
        let mut relations = self.simple_closure_relations.clone();
        relations.push(self.relation.clone());
        relations.sort();
        relations.dedup();
        relations
    }

}
