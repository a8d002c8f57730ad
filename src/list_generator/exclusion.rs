//! Exclusion predicates for list blocks.
//!
//! Unlike the check path, list blocks evaluate exclusions per candidate
//! row, so the object/subject expressions vary with the block shape. The
//! context carries them; the predicate builder is shared by every
//! strategy.

use crate::schema_analyzer::{
    ExclusionBranch, ExclusionConfig, IntersectionGroup, IntersectionPartKind,
};
use crate::sql_ir::{
    CheckPermissionCall, CteDefinition, JoinClause, SqlExpr, SqlQuery, TableExpr, TupleQuery,
};

use super::plan::ListPlan;

/// Expressions an exclusion branch is evaluated against.
#[derive(Debug, Clone)]
pub(crate) struct ExclusionContext {
    pub object_id: SqlExpr,
    pub subject_type: SqlExpr,
    pub subject_id: SqlExpr,
}

impl ExclusionContext {
    /// Candidate-object context: subject fixed by parameters.
    pub fn for_object(object_id: SqlExpr) -> Self {
        Self {
            object_id,
            subject_type: SqlExpr::param("p_subject_type"),
            subject_id: SqlExpr::param("p_subject_id"),
        }
    }

    /// Candidate-subject context: object fixed by parameter.
    pub fn for_subject(subject_id: SqlExpr) -> Self {
        Self {
            object_id: SqlExpr::param("p_object_id"),
            subject_type: SqlExpr::param("p_subject_type"),
            subject_id,
        }
    }
}

/// `TRUE` when the candidate is excluded. Callers negate.
pub(crate) fn exclusion_predicate(
    plan: &ListPlan,
    config: &ExclusionConfig,
    ctx: &ExclusionContext,
) -> Option<SqlExpr> {
    if config.is_empty() {
        return None;
    }
    let branches: Vec<SqlExpr> = config
        .branches
        .iter()
        .map(|branch| branch_predicate(plan, branch, ctx))
        .collect();
    Some(SqlExpr::or(branches))
}

fn branch_predicate(plan: &ListPlan, branch: &ExclusionBranch, ctx: &ExclusionContext) -> SqlExpr {
    match branch {
        ExclusionBranch::Simple { relations, .. } => {
            let query = TupleQuery::new("excl")
                .object_type(&plan.object_type)
                .relations(relations)
                .object_id(ctx.object_id.clone())
                .subject_type(ctx.subject_type.clone())
                .subject_id_matches(ctx.subject_id.clone(), true);
            SqlExpr::exists(query.build())
        }
        ExclusionBranch::Complex { relation } => CheckPermissionCall::fresh(
            plan.internal_check_dispatcher(),
            ctx.subject_type.clone(),
            ctx.subject_id.clone(),
            SqlExpr::string(relation),
            SqlExpr::string(&plan.object_type),
            ctx.object_id.clone(),
        )
        .allows(),
        ExclusionBranch::TupleToUserset(parent) => {
            let link = TupleQuery::new("excl_link");
            let call = CheckPermissionCall::fresh(
                plan.internal_check_dispatcher(),
                ctx.subject_type.clone(),
                ctx.subject_id.clone(),
                SqlExpr::string(&parent.target_relation),
                link.col("subject_type"),
                link.col("subject_id"),
            );
            let guard = link
                .col("subject_type")
                .in_strings(parent.target_types.iter().map(|t| t.to_string()));
            let query = link
                .object_type(&plan.object_type)
                .relations(std::slice::from_ref(&parent.linking_relation))
                .object_id(ctx.object_id.clone())
                .filter(guard)
                .filter(call.allows());
            SqlExpr::exists(query.build())
        }
        ExclusionBranch::Intersection(group) => intersection_predicate(plan, group, ctx),
    }
}

fn intersection_predicate(
    plan: &ListPlan,
    group: &IntersectionGroup,
    ctx: &ExclusionContext,
) -> SqlExpr {
    let parts: Vec<SqlExpr> = group
        .parts
        .iter()
        .map(|part| {
            let base = match &part.kind {
                IntersectionPartKind::Direct {
                    relations,
                    has_wildcard,
                    ..
                } => {
                    let query = TupleQuery::new("excl_part")
                        .object_type(&plan.object_type)
                        .relations(relations)
                        .object_id(ctx.object_id.clone())
                        .subject_type(ctx.subject_type.clone())
                        .subject_id_matches(ctx.subject_id.clone(), *has_wildcard);
                    SqlExpr::exists(query.build())
                }
                IntersectionPartKind::ComputedUserset {
                    relation,
                    satisfying_relations,
                    has_wildcard,
                    is_complex,
                } => {
                    if *is_complex {
                        CheckPermissionCall::fresh(
                            plan.internal_check_dispatcher(),
                            ctx.subject_type.clone(),
                            ctx.subject_id.clone(),
                            SqlExpr::string(relation),
                            SqlExpr::string(&plan.object_type),
                            ctx.object_id.clone(),
                        )
                        .allows()
                    } else {
                        let query = TupleQuery::new("excl_part")
                            .object_type(&plan.object_type)
                            .relations(satisfying_relations)
                            .object_id(ctx.object_id.clone())
                            .subject_type(ctx.subject_type.clone())
                            .subject_id_matches(ctx.subject_id.clone(), *has_wildcard);
                        SqlExpr::exists(query.build())
                    }
                }
                IntersectionPartKind::TupleToUserset(parent) => branch_predicate(
                    plan,
                    &ExclusionBranch::TupleToUserset(parent.clone()),
                    ctx,
                ),
            };
            match &part.but_not {
                Some(config) => {
                    let nested = exclusion_predicate(plan, config, ctx)
                        .unwrap_or(SqlExpr::BoolLit(false));
                    SqlExpr::and(vec![base, nested.negate()])
                }
                None => base,
            }
        })
        .collect();
    SqlExpr::and(parts)
}

pub(crate) const EXCLUDED_SUBJECTS_CTE: &str = "excluded_subjects";

/// `excluded_subjects` CTE: all subject ids banned on the object,
/// wildcard rows included.
pub(crate) fn excluded_subjects_cte(plan: &ListPlan) -> CteDefinition {
    let mut relations: Vec<String> = Vec::new();
    for branch in &plan.exclusions.branches {
        if let ExclusionBranch::Simple {
            relations: branch_relations,
            ..
        } = branch
        {
            relations.extend(branch_relations.iter().cloned());
        }
    }
    relations.sort();
    relations.dedup();

    let excl = TupleQuery::new("excl");
    let query = excl
        .distinct()
        .object_type(&plan.object_type)
        .relations(&relations)
        .object_id(SqlExpr::param("p_object_id"))
        .select(SqlExpr::column("excl", "subject_id"))
        .build();
    CteDefinition::new(EXCLUDED_SUBJECTS_CTE, Vec::new(), SqlQuery::Select(query))
}

/// Anti-join tail replacing per-row `NOT EXISTS` predicates:
/// `LEFT JOIN excluded_subjects es ON (match) WHERE es.subject_id IS NULL`.
pub(crate) fn anti_join_clause(base_subject: SqlExpr) -> (JoinClause, SqlExpr) {
    let es_subject = SqlExpr::column("es", "subject_id");
    let join = JoinClause::left(
        TableExpr::named_as(EXCLUDED_SUBJECTS_CTE, "es"),
        SqlExpr::or(vec![
            es_subject.clone().eq(base_subject),
            es_subject.clone().is_wildcard(),
        ]),
    );
    (join, es_subject.is_null())
}
