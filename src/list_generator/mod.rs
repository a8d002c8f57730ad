//! List-function generation: plan → strategy lowering → PL/pgSQL
//! function with cursor pagination.

mod assembly;
pub mod block_set;
mod composed;
mod depth_exceeded;
mod direct_userset;
mod errors;
mod exclusion;
mod intersection;
pub mod pagination;
pub mod plan;
mod recursive_cte;
mod self_ref_userset;
mod shared_blocks;
mod wildcard_tail;

#[cfg(test)]
mod list_tests;

pub use block_set::BlockSet;
pub use errors::ListGeneratorError;
pub use plan::{build_list_objects_plan, build_list_subjects_plan, ListDirection, ListPlan};

use log::debug;

use crate::inline_data::InlineData;
use crate::schema_analyzer::{ListStrategy, RelationAnalysis};
use crate::sql_ir::{FunctionArg, LocalDeclaration, PlpgsqlFunction, PlpgsqlStmt, SqlExpr, Volatility};

/// Planner row estimate carried by every emitted list function.
const LIST_ROWS_ESTIMATE: u32 = 100;

/// Declarations and body statements a strategy lowers to; the shell
/// around them is shared.
pub(crate) struct ListFunctionParts {
    pub declarations: Vec<LocalDeclaration>,
    pub body: Vec<PlpgsqlStmt>,
}

/// Build one list function. Returns `ListNotAllowed` when the analysis
/// disallows listing; callers decide whether that skips or aborts.
pub fn build_list_function(
    analysis: &RelationAnalysis,
    inline: &InlineData,
    direction: ListDirection,
) -> Result<PlpgsqlFunction, ListGeneratorError> {
    let plan = match direction {
        ListDirection::Objects => build_list_objects_plan(analysis),
        ListDirection::Subjects => build_list_subjects_plan(analysis),
    };
    if !plan.list_allowed {
        return Err(ListGeneratorError::ListNotAllowed {
            object_type: plan.object_type,
            relation: plan.relation,
        });
    }

    debug!(
        "building {} with strategy {:?}",
        plan.function_name, plan.strategy
    );

    let parts = match plan.strategy {
        ListStrategy::Direct | ListStrategy::Userset => direct_userset::build(&plan, inline)?,
        ListStrategy::Recursive => recursive_cte::build(&plan, inline)?,
        ListStrategy::Intersection => intersection::build(&plan, inline)?,
        ListStrategy::SelfRefUserset => self_ref_userset::build(&plan, inline)?,
        ListStrategy::Composed => composed::build(&plan, inline)?,
        ListStrategy::DepthExceeded => depth_exceeded::build(),
    };

    let mut function = PlpgsqlFunction::new(plan.function_name.clone(), returns_clause(direction));
    function.volatility = Volatility::Stable;
    function.rows_estimate = Some(LIST_ROWS_ESTIMATE);
    function.header_comments = vec![header_comment(&plan)];
    function.args = function_args(direction);
    function.declarations = parts.declarations;
    function.body = parts.body;
    Ok(function)
}

fn returns_clause(direction: ListDirection) -> String {
    format!(
        "TABLE({} text, next_cursor text)",
        direction.id_column()
    )
}

fn header_comment(plan: &ListPlan) -> String {
    match plan.direction {
        ListDirection::Objects => format!(
            "Objects of type {} on which the subject holds {}",
            plan.object_type, plan.relation
        ),
        ListDirection::Subjects => format!(
            "Subjects holding {} on a {} object",
            plan.relation, plan.object_type
        ),
    }
}

fn function_args(direction: ListDirection) -> Vec<FunctionArg> {
    match direction {
        ListDirection::Objects => vec![
            FunctionArg::new("p_subject_type", "text"),
            FunctionArg::new("p_subject_id", "text"),
            FunctionArg::with_default("p_limit", "integer", SqlExpr::Null),
            FunctionArg::with_default("p_after", "text", SqlExpr::Null),
        ],
        ListDirection::Subjects => vec![
            FunctionArg::new("p_object_id", "text"),
            FunctionArg::new("p_subject_type", "text"),
            FunctionArg::with_default("p_limit", "integer", SqlExpr::Null),
            FunctionArg::with_default("p_after", "text", SqlExpr::Null),
        ],
    }
}
