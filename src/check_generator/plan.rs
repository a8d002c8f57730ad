//! Check-plan construction and function-type selection.

use serde::{Deserialize, Serialize};

use crate::schema_analyzer::{
    ExclusionBranch, ExclusionConfig, IntersectionGroup, IntersectionPartKind, ParentRelation,
    RelationAnalysis, UsersetPattern,
};
use crate::utils::{
    check_function_name, CHECK_DISPATCHER_INTERNAL, CHECK_DISPATCHER_NO_WILDCARD_INTERNAL,
};

/// Which rendering discipline a check function needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckFunctionType {
    /// Pure boolean composition.
    Direct,
    /// Boolean composition staged through `v_has_access`.
    Intersection,
    /// Visited-array cycle detection around recursive calls.
    Recursive,
    /// Both disciplines.
    RecursiveIntersection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckPlan {
    pub object_type: String,
    pub relation: String,
    pub function_name: String,
    pub no_wildcard: bool,
    /// Self plus simple closure: the tuple-lookup relation set.
    pub direct_relations: Vec<String>,
    pub complex_closure_relations: Vec<String>,
    pub intersection_closure_relations: Vec<String>,
    pub allowed_subject_types: Vec<String>,
    pub userset_patterns: Vec<UsersetPattern>,
    pub parent_relations: Vec<ParentRelation>,
    pub intersection_groups: Vec<IntersectionGroup>,
    pub exclusions: ExclusionConfig,
    /// Wildcard grants count for this variant.
    pub allow_wildcard: bool,
    pub has_direct: bool,
}

impl CheckPlan {
    pub fn build(analysis: &RelationAnalysis, no_wildcard: bool) -> Self {
        Self {
            object_type: analysis.object_type.clone(),
            relation: analysis.relation.clone(),
            function_name: check_function_name(
                &analysis.object_type,
                &analysis.relation,
                no_wildcard,
            ),
            no_wildcard,
            direct_relations: analysis.direct_lookup_relations(),
            complex_closure_relations: analysis.complex_closure_relations.clone(),
            intersection_closure_relations: analysis.intersection_closure_relations.clone(),
            allowed_subject_types: analysis.allowed_subject_types.clone(),
            userset_patterns: analysis.closure_userset_patterns.clone(),
            parent_relations: analysis.parent_relations.clone(),
            intersection_groups: analysis.intersection_groups.clone(),
            exclusions: analysis.exclusions.clone(),
            allow_wildcard: analysis.has_wildcard && !no_wildcard,
            has_direct: analysis.has_direct,
        }
    }

    pub fn has_intersection(&self) -> bool {
        !self.intersection_groups.is_empty()
    }

    pub fn has_parent_relations(&self) -> bool {
        !self.parent_relations.is_empty()
    }

    pub fn has_implied_function_calls(&self) -> bool {
        !self.complex_closure_relations.is_empty()
            || !self.intersection_closure_relations.is_empty()
    }

    /// Access paths that grant on their own, outside intersection groups.
    pub fn has_standalone_access(&self) -> bool {
        self.has_direct
            || !self.userset_patterns.is_empty()
            || self.has_parent_relations()
            || self.has_implied_function_calls()
            || self.direct_relations.len() > 1
    }

    /// Visited-array discipline is required as soon as any lowered block
    /// calls back into the dispatcher.
    pub fn needs_plpgsql(&self) -> bool {
        self.has_parent_relations()
            || self.has_implied_function_calls()
            || self.userset_patterns.iter().any(|p| p.is_complex)
            || exclusion_needs_recursion(&self.exclusions)
            || self
                .intersection_groups
                .iter()
                .any(group_needs_recursion)
    }

    /// Internal dispatcher this variant recurses through.
    pub fn internal_dispatcher(&self) -> &'static str {
        if self.no_wildcard {
            CHECK_DISPATCHER_NO_WILDCARD_INTERNAL
        } else {
            CHECK_DISPATCHER_INTERNAL
        }
    }

    /// Specialised function name for a closure member, same variant.
    pub fn member_function_name(&self, member: &str) -> String {
        check_function_name(&self.object_type, member, self.no_wildcard)
    }
}

pub fn determine_check_function_type(plan: &CheckPlan) -> CheckFunctionType {
    match (plan.needs_plpgsql(), plan.has_intersection()) {
        (false, false) => CheckFunctionType::Direct,
        (false, true) => CheckFunctionType::Intersection,
        (true, false) => CheckFunctionType::Recursive,
        (true, true) => CheckFunctionType::RecursiveIntersection,
    }
}

pub(crate) fn exclusion_needs_recursion(config: &ExclusionConfig) -> bool {
    config.branches.iter().any(|branch| match branch {
        ExclusionBranch::Simple { .. } => false,
        ExclusionBranch::Complex { .. } | ExclusionBranch::TupleToUserset(_) => true,
        ExclusionBranch::Intersection(group) => group_needs_recursion(group),
    })
}

pub(crate) fn group_needs_recursion(group: &IntersectionGroup) -> bool {
    group.parts.iter().any(|part| {
        let kind_recurses = match &part.kind {
            IntersectionPartKind::Direct { .. } => false,
            IntersectionPartKind::ComputedUserset { is_complex, .. } => *is_complex,
            IntersectionPartKind::TupleToUserset(_) => true,
        };
        kind_recurses
            || part
                .but_not
                .as_ref()
                .map(exclusion_needs_recursion)
                .unwrap_or(false)
    })
}
