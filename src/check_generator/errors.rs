use thiserror::Error;

use crate::sql_ir::SqlIrError;

#[derive(Debug, Clone, Error)]
pub enum CheckGeneratorError {
    #[error("check block construction failed: {0}")]
    Ir(#[from] SqlIrError),
    #[error("check plan for {object_type}.{relation} has an intersection group with zero parts")]
    EmptyIntersectionGroup {
        object_type: String,
        relation: String,
    },
}
