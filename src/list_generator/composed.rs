//! Composed strategy: a relation with no grant of its own lists through
//! the first hop of its anchor path; the target relation's own list
//! function carries the rest of the path.

use crate::inline_data::InlineData;
use crate::schema_analyzer::{AnchorStep, AnchorStepKind};
use crate::sql_ir::{JoinClause, SelectStmt, SqlExpr, SqlQuery, TableExpr, TupleQuery};
use crate::utils::{list_objects_function_name, list_subjects_function_name};

use super::assembly::paginated_return;
use super::block_set::BlockSet;
use super::errors::ListGeneratorError;
use super::exclusion::{exclusion_predicate, ExclusionContext};
use super::plan::{ListDirection, ListPlan};
use super::ListFunctionParts;

pub(crate) fn build(
    plan: &ListPlan,
    inline: &InlineData,
) -> Result<ListFunctionParts, ListGeneratorError> {
    let _ = inline;
    let Some(first_step) = plan.indirect_anchor.first() else {
        return Err(ListGeneratorError::MissingAnchor {
            object_type: plan.object_type.clone(),
            relation: plan.relation.clone(),
        });
    };

    let mut set = BlockSet::new(plan.direction);
    match plan.direction {
        ListDirection::Objects => {
            for target_type in &first_step.target_types {
                set.push(objects_step_block(plan, first_step, target_type));
            }
        }
        ListDirection::Subjects => {
            for target_type in &first_step.target_types {
                set.push(subjects_step_block(plan, first_step, target_type));
            }
        }
    }

    let stmt = paginated_return(plan, Vec::new(), false, set)?;
    Ok(ListFunctionParts {
        declarations: Vec::new(),
        body: vec![stmt],
    })
}

fn objects_step_block(plan: &ListPlan, step: &AnchorStep, target_type: &str) -> SqlQuery {
    let target_list = SqlExpr::call(
        list_objects_function_name(target_type, &step.target_relation),
        vec![
            SqlExpr::param("p_subject_type"),
            SqlExpr::param("p_subject_id"),
            SqlExpr::Null,
            SqlExpr::Null,
        ],
    );
    match step.kind {
        AnchorStepKind::Ttu => {
            // Objects linked to an accessible parent.
            let link = TupleQuery::new("link");
            let object_col = link.col("object_id");
            let accessible_parent = SqlExpr::exists(SelectStmt {
                from: Some(TableExpr::function(target_list, "l")),
                where_clause: Some(
                    SqlExpr::column("l", "object_id").eq(SqlExpr::column("link", "subject_id")),
                ),
                ..SelectStmt::new()
            });
            let via = [step.via_relation.clone()];
            let mut query = link
                .distinct()
                .select(object_col.clone())
                .object_type(&plan.object_type)
                .relations(&via)
                .filter(SqlExpr::column("link", "subject_type").eq(SqlExpr::string(target_type)))
                .filter(accessible_parent);
            if let Some(keep) = object_keep(plan, object_col) {
                query = query.filter(keep);
            }
            SqlQuery::Select(query.build())
        }
        AnchorStepKind::Userset => {
            // Objects granted to a userset whose target the subject can
            // reach.
            let granted = TupleQuery::new("granted");
            let object_col = granted.col("object_id");
            let subject = granted.col("subject_id");
            let accessible_userset = SqlExpr::exists(SelectStmt {
                from: Some(TableExpr::function(target_list, "l")),
                where_clause: Some(
                    SqlExpr::column("l", "object_id")
                        .eq(SqlExpr::column("granted", "subject_id").split_object_id()),
                ),
                ..SelectStmt::new()
            });
            let mut query = granted
                .distinct()
                .select(object_col.clone())
                .object_type(&plan.object_type)
                .relations(&plan.all_satisfying_relations)
                .subject_type(SqlExpr::string(target_type))
                .filter(subject.clone().has_userset())
                .filter(
                    subject
                        .split_relation()
                        .eq(SqlExpr::string(&step.target_relation)),
                )
                .filter(accessible_userset);
            if let Some(keep) = object_keep(plan, object_col) {
                query = query.filter(keep);
            }
            SqlQuery::Select(query.build())
        }
    }
}

fn subjects_step_block(plan: &ListPlan, step: &AnchorStep, target_type: &str) -> SqlQuery {
    match step.kind {
        AnchorStepKind::Ttu => {
            let link = TupleQuery::new("link");
            let subject_col = SqlExpr::column("l", "subject_id");
            let lateral = SqlExpr::call(
                list_subjects_function_name(target_type, &step.target_relation),
                vec![
                    SqlExpr::column("link", "subject_id"),
                    SqlExpr::param("p_subject_type"),
                    SqlExpr::Null,
                    SqlExpr::Null,
                ],
            );
            let via = [step.via_relation.clone()];
            let mut query = link
                .distinct()
                .select(subject_col.clone())
                .object_type(&plan.object_type)
                .relations(&via)
                .object_id(SqlExpr::param("p_object_id"))
                .filter(SqlExpr::column("link", "subject_type").eq(SqlExpr::string(target_type)))
                .join(JoinClause::cross_lateral(TableExpr::function(lateral, "l")));
            if let Some(keep) = subject_keep(plan, subject_col) {
                query = query.filter(keep);
            }
            SqlQuery::Select(query.build())
        }
        AnchorStepKind::Userset => {
            let granted = TupleQuery::new("granted");
            let granted_subject = granted.col("subject_id");
            let subject_col = SqlExpr::column("l", "subject_id");
            let lateral = SqlExpr::call(
                list_subjects_function_name(target_type, &step.target_relation),
                vec![
                    granted_subject.clone().split_object_id(),
                    SqlExpr::param("p_subject_type"),
                    SqlExpr::Null,
                    SqlExpr::Null,
                ],
            );
            let mut query = granted
                .distinct()
                .select(subject_col.clone())
                .object_type(&plan.object_type)
                .relations(&plan.all_satisfying_relations)
                .object_id(SqlExpr::param("p_object_id"))
                .subject_type(SqlExpr::string(target_type))
                .filter(granted_subject.clone().has_userset())
                .filter(
                    granted_subject
                        .split_relation()
                        .eq(SqlExpr::string(&step.target_relation)),
                )
                .join(JoinClause::cross_lateral(TableExpr::function(lateral, "l")));
            if let Some(keep) = subject_keep(plan, subject_col) {
                query = query.filter(keep);
            }
            SqlQuery::Select(query.build())
        }
    }
}

fn object_keep(plan: &ListPlan, col: SqlExpr) -> Option<SqlExpr> {
    exclusion_predicate(plan, &plan.exclusions, &ExclusionContext::for_object(col))
        .map(SqlExpr::negate)
}

fn subject_keep(plan: &ListPlan, col: SqlExpr) -> Option<SqlExpr> {
    if plan.use_cte_exclusion {
        return None;
    }
    exclusion_predicate(plan, &plan.exclusions, &ExclusionContext::for_subject(col))
        .map(SqlExpr::negate)
}
