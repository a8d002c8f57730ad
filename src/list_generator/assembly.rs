//! Final assembly of list block sets into a single query: optional
//! strategy CTEs, CTE-based exclusion, wildcard tail, then pagination.

use crate::sql_ir::{
    CteDefinition, PlpgsqlStmt, SelectStmt, SqlExpr, SqlQuery, TableExpr, WithCte,
};

use super::block_set::BlockSet;
use super::errors::ListGeneratorError;
use super::exclusion::{anti_join_clause, excluded_subjects_cte};
use super::pagination::paginate;
use super::plan::{ListDirection, ListPlan};
use super::wildcard_tail::{has_wildcard_cte, wildcard_tail_select, BASE_RESULTS_CTE};

const FILTERED_RESULTS_CTE: &str = "filtered_results";

/// Combine blocks and strategy CTEs into the function's single
/// `RETURN QUERY` statement.
pub(crate) fn paginated_return(
    plan: &ListPlan,
    strategy_ctes: Vec<CteDefinition>,
    recursive: bool,
    set: BlockSet,
) -> Result<PlpgsqlStmt, ListGeneratorError> {
    if set.primary.is_empty() {
        return Err(ListGeneratorError::NoBlocks {
            object_type: plan.object_type.clone(),
            relation: plan.relation.clone(),
        });
    }
    let union = set.into_union()?;
    let query = assemble(plan, strategy_ctes, recursive, union)?;
    let wildcard_first =
        plan.direction == ListDirection::Subjects && plan.has_wildcard;
    let paginated = paginate(query, plan.direction.id_column(), wildcard_first);
    Ok(PlpgsqlStmt::ReturnQuery(paginated))
}

fn assemble(
    plan: &ListPlan,
    mut ctes: Vec<CteDefinition>,
    recursive: bool,
    union: SqlQuery,
) -> Result<SqlQuery, ListGeneratorError> {
    let use_tail = plan.direction == ListDirection::Subjects
        && plan.has_wildcard
        && plan.has_userset_patterns();
    let use_cte_exclusion = plan.use_cte_exclusion;

    if !use_tail && !use_cte_exclusion {
        if ctes.is_empty() {
            return Ok(union);
        }
        return Ok(SqlQuery::With(WithCte::try_new(recursive, ctes, union)?));
    }

    ctes.push(CteDefinition::new(BASE_RESULTS_CTE, Vec::new(), union));
    let mut tail_source = BASE_RESULTS_CTE;

    if use_cte_exclusion {
        ctes.push(excluded_subjects_cte(plan));
        let (join, keep) = anti_join_clause(SqlExpr::column("br", "subject_id"));
        let filtered = SelectStmt {
            columns: vec![SqlExpr::column("br", "subject_id")],
            from: Some(TableExpr::named_as(BASE_RESULTS_CTE, "br")),
            joins: vec![join],
            where_clause: Some(keep),
            ..SelectStmt::new()
        };
        ctes.push(CteDefinition::new(
            FILTERED_RESULTS_CTE,
            Vec::new(),
            SqlQuery::Select(filtered),
        ));
        tail_source = FILTERED_RESULTS_CTE;
    }

    let body = if use_tail {
        ctes.push(has_wildcard_cte(plan));
        SqlQuery::Select(wildcard_tail_select(plan, tail_source))
    } else {
        SqlQuery::Select(SelectStmt {
            columns: vec![SqlExpr::column(tail_source, "subject_id")],
            from: Some(TableExpr::named(tail_source)),
            ..SelectStmt::new()
        })
    };

    Ok(SqlQuery::With(WithCte::try_new(recursive, ctes, body)?))
}
