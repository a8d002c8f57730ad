//! Lowering of a [`CheckPlan`] into the typed check blocks.
//!
//! Every block is a finished IR expression; the renderer only composes
//! them into the procedural skeleton. Recursive calls always receive the
//! caller-provided `visited` expression so the cycle-detection invariant
//! is decided in one place.

use crate::inline_data::InlineData;
use crate::schema_analyzer::{
    ExclusionBranch, ExclusionConfig, IntersectionGroup, IntersectionPart, IntersectionPartKind,
    ParentRelation, UsersetPattern,
};
use crate::sql_ir::{
    CheckPermissionCall, JoinClause, SelectStmt, SqlExpr, TableExpr, TupleQuery, TUPLES_TABLE,
};

use super::errors::CheckGeneratorError;
use super::plan::CheckPlan;

#[derive(Debug, Clone, PartialEq)]
pub struct ImpliedFunctionCall {
    pub function_name: String,
    pub call: SqlExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckBlocks {
    pub direct_check: Option<SqlExpr>,
    pub userset_checks: Vec<SqlExpr>,
    pub parent_relation_checks: Vec<SqlExpr>,
    pub implied_function_calls: Vec<ImpliedFunctionCall>,
    /// One conjunction per intersection group, `but not` folded in.
    pub intersection_group_checks: Vec<SqlExpr>,
    /// Disjunction of exclusion branches; TRUE means access is revoked.
    pub exclusion_check: Option<SqlExpr>,
    pub userset_subject_self_check: SelectStmt,
    pub userset_subject_computed_check: Option<SelectStmt>,
}

impl CheckBlocks {
    /// All access paths that grant on their own, as one disjunction.
    pub fn standalone_access_expr(&self) -> Option<SqlExpr> {
        let mut paths = Vec::new();
        if let Some(direct) = &self.direct_check {
            paths.push(direct.clone());
        }
        paths.extend(self.userset_checks.iter().cloned());
        paths.extend(self.parent_relation_checks.iter().cloned());
        paths.extend(self.implied_function_calls.iter().map(|c| c.call.clone()));
        if paths.is_empty() {
            None
        } else {
            Some(SqlExpr::or(paths))
        }
    }
}

pub fn build_check_blocks(
    plan: &CheckPlan,
    inline: &InlineData,
    visited: &SqlExpr,
) -> Result<CheckBlocks, CheckGeneratorError> {
    let direct_check = if plan.has_direct || plan.direct_relations.len() > 1 {
        Some(direct_check_expr(plan))
    } else {
        None
    };

    let userset_checks = plan
        .userset_patterns
        .iter()
        .map(|pattern| userset_check_expr(plan, pattern, visited))
        .collect();

    let parent_relation_checks = plan
        .parent_relations
        .iter()
        .map(|parent| parent_check_expr(plan, parent, "link", visited))
        .collect();

    let mut implied_function_calls = Vec::new();
    for member in plan
        .complex_closure_relations
        .iter()
        .chain(plan.intersection_closure_relations.iter())
    {
        let function_name = plan.member_function_name(member);
        let call = SqlExpr::call(
            function_name.clone(),
            vec![
                SqlExpr::param("p_subject_type"),
                SqlExpr::param("p_subject_id"),
                SqlExpr::param("p_object_id"),
                visited.clone(),
            ],
        )
        .eq(SqlExpr::int(1));
        implied_function_calls.push(ImpliedFunctionCall {
            function_name,
            call,
        });
    }

    let mut intersection_group_checks = Vec::new();
    for group in &plan.intersection_groups {
        intersection_group_checks.push(intersection_group_expr(plan, group, visited)?);
    }

    let exclusion_check = exclusion_config_expr(plan, &plan.exclusions, visited)?;

    Ok(CheckBlocks {
        direct_check,
        userset_checks,
        parent_relation_checks,
        implied_function_calls,
        intersection_group_checks,
        exclusion_check,
        userset_subject_self_check: userset_subject_self_check(plan, inline),
        userset_subject_computed_check: userset_subject_computed_check(plan, inline),
    })
}

fn direct_check_expr(plan: &CheckPlan) -> SqlExpr {
    let query = TupleQuery::new("t")
        .object_type(&plan.object_type)
        .relations(&plan.direct_relations)
        .object_id(SqlExpr::param("p_object_id"))
        .subject_type(SqlExpr::param("p_subject_type"))
        .subject_id_matches(SqlExpr::param("p_subject_id"), plan.allow_wildcard);
    SqlExpr::exists(query.build())
}

fn userset_check_expr(plan: &CheckPlan, pattern: &UsersetPattern, visited: &SqlExpr) -> SqlExpr {
    if pattern.is_complex {
        complex_userset_check_expr(plan, pattern, visited)
    } else {
        simple_userset_check_expr(plan, pattern)
    }
}

/// Grant tuple joined with membership tuples: the subject belongs to the
/// userset the grant names.
fn simple_userset_check_expr(plan: &CheckPlan, pattern: &UsersetPattern) -> SqlExpr {
    let granted = TupleQuery::new("granted");
    let granted_subject = granted.col("subject_id");
    let membership_wildcard = pattern.has_wildcard && plan.allow_wildcard;

    let membership_subject = SqlExpr::column("membership", "subject_id");
    let membership_match = if membership_wildcard {
        SqlExpr::or(vec![
            membership_subject.clone().eq(SqlExpr::param("p_subject_id")),
            membership_subject.is_wildcard(),
        ])
    } else {
        membership_subject.eq(SqlExpr::param("p_subject_id"))
    };

    let join = JoinClause::inner(
        TableExpr::named_as(TUPLES_TABLE, "membership"),
        SqlExpr::and(vec![
            SqlExpr::column("membership", "object_type").eq(SqlExpr::string(&pattern.subject_type)),
            SqlExpr::column("membership", "object_id")
                .eq(granted_subject.clone().split_object_id()),
            SqlExpr::column("membership", "relation").in_strings(
                pattern
                    .satisfying_relations
                    .iter()
                    .map(|r| r.to_string()),
            ),
            SqlExpr::column("membership", "subject_type").eq(SqlExpr::param("p_subject_type")),
            membership_match,
        ]),
    );

    let query = granted
        .object_type(&plan.object_type)
        .relations(&plan.direct_relations)
        .object_id(SqlExpr::param("p_object_id"))
        .subject_type(SqlExpr::string(&pattern.subject_type))
        .filter(SqlExpr::column("granted", "subject_id").has_userset())
        .filter(
            SqlExpr::column("granted", "subject_id")
                .split_relation()
                .eq(SqlExpr::string(&pattern.subject_relation)),
        )
        .join(join);
    SqlExpr::exists(query.build())
}

/// Grant tuple validated by a recursive permission call on the userset's
/// own relation.
fn complex_userset_check_expr(
    plan: &CheckPlan,
    pattern: &UsersetPattern,
    visited: &SqlExpr,
) -> SqlExpr {
    let granted = TupleQuery::new("granted");
    let subject = SqlExpr::column("granted", "subject_id");
    let call = CheckPermissionCall::new(
        plan.internal_dispatcher(),
        SqlExpr::param("p_subject_type"),
        SqlExpr::param("p_subject_id"),
        subject.clone().split_relation(),
        SqlExpr::string(&pattern.subject_type),
        subject.clone().split_object_id(),
        visited.clone(),
    );
    let query = granted
        .object_type(&plan.object_type)
        .relations(&plan.direct_relations)
        .object_id(SqlExpr::param("p_object_id"))
        .subject_type(SqlExpr::string(&pattern.subject_type))
        .filter(subject.clone().has_userset())
        .filter(
            subject
                .split_relation()
                .eq(SqlExpr::string(&pattern.subject_relation)),
        )
        .filter(call.allows());
    SqlExpr::exists(query.build())
}

/// Link tuple whose parent object grants the target relation.
fn parent_check_expr(
    plan: &CheckPlan,
    parent: &ParentRelation,
    alias: &str,
    visited: &SqlExpr,
) -> SqlExpr {
    let link = TupleQuery::new(alias);
    let call = CheckPermissionCall::new(
        plan.internal_dispatcher(),
        SqlExpr::param("p_subject_type"),
        SqlExpr::param("p_subject_id"),
        SqlExpr::string(&parent.target_relation),
        link.col("subject_type"),
        link.col("subject_id"),
        visited.clone(),
    );
    let subject_type_guard = link
        .col("subject_type")
        .in_strings(parent.target_types.iter().map(|t| t.to_string()));
    let query = link
        .object_type(&plan.object_type)
        .relations(std::slice::from_ref(&parent.linking_relation))
        .object_id(SqlExpr::param("p_object_id"))
        .filter(subject_type_guard)
        .filter(call.allows());
    SqlExpr::exists(query.build())
}

fn intersection_group_expr(
    plan: &CheckPlan,
    group: &IntersectionGroup,
    visited: &SqlExpr,
) -> Result<SqlExpr, CheckGeneratorError> {
    if group.parts.is_empty() {
        return Err(CheckGeneratorError::EmptyIntersectionGroup {
            object_type: plan.object_type.clone(),
            relation: plan.relation.clone(),
        });
    }
    let parts: Result<Vec<SqlExpr>, CheckGeneratorError> = group
        .parts
        .iter()
        .map(|part| intersection_part_expr(plan, part, visited))
        .collect();
    Ok(SqlExpr::and(parts?))
}

fn intersection_part_expr(
    plan: &CheckPlan,
    part: &IntersectionPart,
    visited: &SqlExpr,
) -> Result<SqlExpr, CheckGeneratorError> {
    let base = match &part.kind {
        IntersectionPartKind::Direct {
            relations,
            subject_types: _,
            has_wildcard,
        } => {
            let query = TupleQuery::new("t")
                .object_type(&plan.object_type)
                .relations(relations)
                .object_id(SqlExpr::param("p_object_id"))
                .subject_type(SqlExpr::param("p_subject_type"))
                .subject_id_matches(
                    SqlExpr::param("p_subject_id"),
                    *has_wildcard && plan.allow_wildcard,
                );
            SqlExpr::exists(query.build())
        }
        IntersectionPartKind::ComputedUserset {
            relation,
            satisfying_relations,
            has_wildcard,
            is_complex,
        } => {
            if *is_complex {
                CheckPermissionCall::new(
                    plan.internal_dispatcher(),
                    SqlExpr::param("p_subject_type"),
                    SqlExpr::param("p_subject_id"),
                    SqlExpr::string(relation),
                    SqlExpr::string(&plan.object_type),
                    SqlExpr::param("p_object_id"),
                    visited.clone(),
                )
                .allows()
            } else {
                let query = TupleQuery::new("t")
                    .object_type(&plan.object_type)
                    .relations(satisfying_relations)
                    .object_id(SqlExpr::param("p_object_id"))
                    .subject_type(SqlExpr::param("p_subject_type"))
                    .subject_id_matches(
                        SqlExpr::param("p_subject_id"),
                        *has_wildcard && plan.allow_wildcard,
                    );
                SqlExpr::exists(query.build())
            }
        }
        IntersectionPartKind::TupleToUserset(parent) => {
            parent_check_expr(plan, parent, "link", visited)
        }
    };
    match &part.but_not {
        Some(config) => {
            let exclusion = exclusion_config_expr(plan, config, visited)?
                .unwrap_or(SqlExpr::BoolLit(false));
            Ok(SqlExpr::and(vec![base, exclusion.negate()]))
        }
        None => Ok(base),
    }
}

fn exclusion_branch_expr(
    plan: &CheckPlan,
    branch: &ExclusionBranch,
    visited: &SqlExpr,
) -> Result<SqlExpr, CheckGeneratorError> {
    match branch {
        ExclusionBranch::Simple { relations, .. } => {
            // Wildcard grants always revoke: `but not blocked` with a
            // `blocked` wildcard tuple bans every subject of that type.
            let query = TupleQuery::new("excl")
                .object_type(&plan.object_type)
                .relations(relations)
                .object_id(SqlExpr::param("p_object_id"))
                .subject_type(SqlExpr::param("p_subject_type"))
                .subject_id_matches(SqlExpr::param("p_subject_id"), true);
            Ok(SqlExpr::exists(query.build()))
        }
        ExclusionBranch::Complex { relation } => Ok(CheckPermissionCall::new(
            plan.internal_dispatcher(),
            SqlExpr::param("p_subject_type"),
            SqlExpr::param("p_subject_id"),
            SqlExpr::string(relation),
            SqlExpr::string(&plan.object_type),
            SqlExpr::param("p_object_id"),
            visited.clone(),
        )
        .allows()),
        ExclusionBranch::TupleToUserset(parent) => {
            Ok(parent_check_expr(plan, parent, "excl_link", visited))
        }
        ExclusionBranch::Intersection(group) => intersection_group_expr(plan, group, visited),
    }
}

pub(crate) fn exclusion_config_expr(
    plan: &CheckPlan,
    config: &ExclusionConfig,
    visited: &SqlExpr,
) -> Result<Option<SqlExpr>, CheckGeneratorError> {
    if config.is_empty() {
        return Ok(None);
    }
    let branches: Result<Vec<SqlExpr>, CheckGeneratorError> = config
        .branches
        .iter()
        .map(|branch| exclusion_branch_expr(plan, branch, visited))
        .collect();
    Ok(Some(SqlExpr::or(branches?)))
}

/// `SELECT 1` satisfied when the caller's userset subject denotes this
/// object and a relation that satisfies the checked one.
fn userset_subject_self_check(plan: &CheckPlan, inline: &InlineData) -> SelectStmt {
    let subject = SqlExpr::param("p_subject_id");
    SelectStmt {
        from: Some(inline.closure_values(&plan.object_type, &plan.relation, "closure")),
        where_clause: Some(SqlExpr::and(vec![
            SqlExpr::param("p_subject_type").eq(SqlExpr::string(&plan.object_type)),
            subject.clone().split_object_id().eq(SqlExpr::param("p_object_id")),
            subject
                .split_relation()
                .eq(SqlExpr::column("closure", "satisfying_relation")),
        ])),
        ..SelectStmt::new()
    }
}

/// `SELECT 1` satisfied when a stored grant names a userset the caller's
/// userset subject implies.
fn userset_subject_computed_check(plan: &CheckPlan, inline: &InlineData) -> Option<SelectStmt> {
    if plan.userset_patterns.is_empty() {
        return None;
    }
    let caller = SqlExpr::param("p_subject_id");
    let granted_subject = SqlExpr::column("t", "subject_id");
    let join = JoinClause::inner(
        inline.userset_pattern_values(&plan.object_type, &plan.relation, "pat"),
        SqlExpr::and(vec![
            SqlExpr::column("t", "subject_type").eq(SqlExpr::column("pat", "subject_type")),
            granted_subject
                .clone()
                .split_relation()
                .eq(SqlExpr::column("pat", "subject_relation")),
        ]),
    );
    let query = TupleQuery::new("t")
        .object_type(&plan.object_type)
        .relations(&plan.direct_relations)
        .object_id(SqlExpr::param("p_object_id"))
        .subject_type(SqlExpr::param("p_subject_type"))
        .filter(
            granted_subject
                .split_object_id()
                .eq(caller.clone().split_object_id()),
        )
        .filter(
            caller
                .split_relation()
                .eq(SqlExpr::column("pat", "satisfying_relation")),
        )
        .join(join);
    Some(query.build())
}
