//! The Direct/Userset strategy family: shared blocks, no extra CTEs.

use crate::inline_data::InlineData;

use super::assembly::paginated_return;
use super::errors::ListGeneratorError;
use super::plan::{ListDirection, ListPlan};
use super::shared_blocks::{object_eq_param, ListBlockBuilder};
use super::ListFunctionParts;

pub(crate) fn build(
    plan: &ListPlan,
    inline: &InlineData,
) -> Result<ListFunctionParts, ListGeneratorError> {
    let builder = ListBlockBuilder::new(plan, inline);
    let stmt = match plan.direction {
        ListDirection::Objects => {
            paginated_return(plan, Vec::new(), false, builder.objects_block_set())?
        }
        ListDirection::Subjects => paginated_return(
            plan,
            Vec::new(),
            false,
            builder.subjects_block_set(&object_eq_param),
        )?,
    };
    Ok(ListFunctionParts {
        declarations: Vec::new(),
        body: vec![stmt],
    })
}
