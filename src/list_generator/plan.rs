//! List-plan construction.

use serde::{Deserialize, Serialize};

use crate::schema_analyzer::{
    AnchorStep, ExclusionConfig, IntersectionGroup, ListStrategy, ParentRelation,
    RelationAnalysis, UsersetPattern,
};
use crate::utils::{
    list_objects_function_name, list_subjects_function_name, CHECK_DISPATCHER,
    CHECK_DISPATCHER_INTERNAL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListDirection {
    Objects,
    Subjects,
}

impl ListDirection {
    /// Name of the single projected column, also the pagination key.
    pub fn id_column(self) -> &'static str {
        match self {
            ListDirection::Objects => "object_id",
            ListDirection::Subjects => "subject_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPlan {
    pub object_type: String,
    pub relation: String,
    pub function_name: String,
    pub direction: ListDirection,
    pub strategy: ListStrategy,
    pub direct_relations: Vec<String>,
    pub complex_closure_relations: Vec<String>,
    pub intersection_closure_relations: Vec<String>,
    /// Full closure: direct set plus complex and intersectional members.
    pub all_satisfying_relations: Vec<String>,
    pub allowed_subject_types: Vec<String>,
    pub userset_patterns: Vec<UsersetPattern>,
    pub parent_relations: Vec<ParentRelation>,
    pub intersection_groups: Vec<IntersectionGroup>,
    pub exclusions: ExclusionConfig,
    pub indirect_anchor: Vec<AnchorStep>,
    pub has_wildcard: bool,
    pub has_direct: bool,
    pub list_allowed: bool,
    /// Replace per-row anti-predicates with an `excluded_subjects`
    /// anti-join. Only sound when every exclusion is a plain lookup.
    pub use_cte_exclusion: bool,
}

impl ListPlan {
    pub fn has_userset_patterns(&self) -> bool {
        !self.userset_patterns.is_empty()
    }

    pub fn has_standalone_access(&self) -> bool {
        self.has_direct
            || self.direct_relations.len() > 1
            || self.has_userset_patterns()
            || !self.parent_relations.is_empty()
            || !self.complex_closure_relations.is_empty()
            || !self.intersection_closure_relations.is_empty()
    }

    /// Dispatcher for calls inside emitted list SQL that start a fresh
    /// resolution chain.
    pub fn fresh_check_dispatcher(&self) -> &'static str {
        CHECK_DISPATCHER
    }

    /// Internal dispatcher for calls that keep the visited signature.
    pub fn internal_check_dispatcher(&self) -> &'static str {
        CHECK_DISPATCHER_INTERNAL
    }
}

fn base_plan(analysis: &RelationAnalysis, direction: ListDirection, function_name: String) -> ListPlan {
    let mut all_satisfying = analysis.direct_lookup_relations();
    all_satisfying.extend(analysis.complex_closure_relations.iter().cloned());
    all_satisfying.extend(analysis.intersection_closure_relations.iter().cloned());
    all_satisfying.sort();
    all_satisfying.dedup();

    ListPlan {
        object_type: analysis.object_type.clone(),
        relation: analysis.relation.clone(),
        function_name,
        direction,
        strategy: analysis.list_strategy,
        direct_relations: analysis.direct_lookup_relations(),
        complex_closure_relations: analysis.complex_closure_relations.clone(),
        intersection_closure_relations: analysis.intersection_closure_relations.clone(),
        all_satisfying_relations: all_satisfying,
        allowed_subject_types: analysis.allowed_subject_types.clone(),
        userset_patterns: analysis.closure_userset_patterns.clone(),
        parent_relations: analysis.parent_relations.clone(),
        intersection_groups: analysis.intersection_groups.clone(),
        exclusions: analysis.exclusions.clone(),
        indirect_anchor: analysis.indirect_anchor.clone(),
        has_wildcard: analysis.has_wildcard,
        has_direct: analysis.has_direct,
        list_allowed: analysis.capabilities.list_allowed,
        use_cte_exclusion: false,
    }
}

pub fn build_list_objects_plan(analysis: &RelationAnalysis) -> ListPlan {
    base_plan(
        analysis,
        ListDirection::Objects,
        list_objects_function_name(&analysis.object_type, &analysis.relation),
    )
}

pub fn build_list_subjects_plan(analysis: &RelationAnalysis) -> ListPlan {
    let mut plan = base_plan(
        analysis,
        ListDirection::Subjects,
        list_subjects_function_name(&analysis.object_type, &analysis.relation),
    );
    plan.use_cte_exclusion = !plan.exclusions.is_empty()
        && plan.exclusions.all_simple()
        && plan.has_userset_patterns();
    plan
}
