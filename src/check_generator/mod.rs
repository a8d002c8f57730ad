//! Check-function generation: plan → blocks → PL/pgSQL function.

pub mod blocks;
mod errors;
pub mod plan;
pub mod render;

#[cfg(test)]
mod check_tests;

pub use blocks::{build_check_blocks, CheckBlocks, ImpliedFunctionCall};
pub use errors::CheckGeneratorError;
pub use plan::{determine_check_function_type, CheckFunctionType, CheckPlan};
pub use render::render_check_function;

use crate::inline_data::InlineData;
use crate::schema_analyzer::RelationAnalysis;
use crate::sql_ir::{PlpgsqlFunction, SqlExpr};

/// Build the complete check function for one relation, in the requested
/// wildcard variant.
pub fn build_check_function(
    analysis: &RelationAnalysis,
    inline: &InlineData,
    no_wildcard: bool,
) -> Result<PlpgsqlFunction, CheckGeneratorError> {
    let plan = CheckPlan::build(analysis, no_wildcard);
    let function_type = determine_check_function_type(&plan);
    let visited = match function_type {
        CheckFunctionType::Recursive | CheckFunctionType::RecursiveIntersection => {
            render::recursive_visited_expr()
        }
        // Non-recursive bodies never lower a recursive call; the parameter
        // is still threaded so the expression stays well-formed.
        CheckFunctionType::Direct | CheckFunctionType::Intersection => SqlExpr::param("p_visited"),
    };
    let blocks = build_check_blocks(&plan, inline, &visited)?;
    Ok(render_check_function(&plan, &blocks, function_type))
}
