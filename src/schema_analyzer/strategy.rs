//! Capability and list-strategy decisions.
//!
//! The strategy table is ordered: the first matching rule wins. Checks
//! are always possible; listing requires at least one reachable grant
//! path.

use crate::sql_ir::MAX_RESOLUTION_DEPTH;

use super::analysis::{
    AnchorStep, Capabilities, ListStrategy, ParentRelation, UsersetPattern,
};

pub(crate) struct StrategyInputs<'a> {
    pub object_type: &'a str,
    pub relation: &'a str,
    pub has_intersection: bool,
    pub has_direct: bool,
    pub has_implied: bool,
    pub max_userset_depth: usize,
    pub closure_userset_patterns: &'a [UsersetPattern],
    pub parent_relations: &'a [ParentRelation],
    pub indirect_anchor: &'a [AnchorStep],
    pub closure_has_direct: bool,
}

pub(crate) fn decide(inputs: &StrategyInputs<'_>) -> (Capabilities, ListStrategy) {
    let strategy = pick_strategy(inputs);
    let list_allowed = inputs.closure_has_direct || !inputs.indirect_anchor.is_empty();
    (
        Capabilities {
            check_allowed: true,
            list_allowed,
        },
        strategy,
    )
}

fn pick_strategy(inputs: &StrategyInputs<'_>) -> ListStrategy {
    if inputs.has_intersection {
        return ListStrategy::Intersection;
    }
    if inputs.max_userset_depth > MAX_RESOLUTION_DEPTH as usize {
        return ListStrategy::DepthExceeded;
    }
    let self_ref_userset = inputs.closure_userset_patterns.iter().any(|p| {
        p.subject_type == inputs.object_type && p.subject_relation == inputs.relation
    });
    if self_ref_userset {
        return ListStrategy::SelfRefUserset;
    }
    if inputs
        .parent_relations
        .iter()
        .any(|p: &ParentRelation| p.has_self_referential_link)
    {
        return ListStrategy::Recursive;
    }
    if !inputs.has_direct && !inputs.has_implied && !inputs.indirect_anchor.is_empty() {
        return ListStrategy::Composed;
    }
    if !inputs.closure_userset_patterns.is_empty() {
        return ListStrategy::Userset;
    }
    ListStrategy::Direct
}
