use thiserror::Error;

use crate::check_generator::CheckGeneratorError;
use crate::list_generator::ListGeneratorError;

#[derive(Debug, Error)]
pub enum SqlGeneratorError {
    #[error(transparent)]
    Check(#[from] CheckGeneratorError),
    #[error(transparent)]
    List(#[from] ListGeneratorError),
    #[error("relation {object_type}.{relation} cannot be listed (strict mode refuses to skip list emission)")]
    UnsupportedCombination {
        object_type: String,
        relation: String,
    },
    #[error("emitted function name '{0}' failed identifier validation")]
    InvalidFunctionName(String),
}
