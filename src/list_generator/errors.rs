use thiserror::Error;

use crate::sql_ir::SqlIrError;

#[derive(Debug, Clone, Error)]
pub enum ListGeneratorError {
    #[error("list block construction failed: {0}")]
    Ir(#[from] SqlIrError),
    #[error("relation {object_type}.{relation} plans a Composed listing but carries no anchor path (analyzer/planner disagreement)")]
    MissingAnchor {
        object_type: String,
        relation: String,
    },
    #[error("relation {object_type}.{relation} produced no list blocks (listing should have been disallowed)")]
    NoBlocks {
        object_type: String,
        relation: String,
    },
    #[error("list generation requested for {object_type}.{relation} although listing is not allowed")]
    ListNotAllowed {
        object_type: String,
        relation: String,
    },
}
