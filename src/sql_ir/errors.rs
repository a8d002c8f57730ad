use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SqlIrError {
    #[error("UNION requires at least one input query (builder produced zero blocks)")]
    EmptyUnion,
    #[error("INTERSECT requires at least one input query (intersection group has zero parts)")]
    EmptyIntersection,
    #[error("WITH requires at least one CTE definition")]
    EmptyWith,
    #[error("inline VALUES table requires at least one declared column")]
    EmptyValuesColumns,
    #[error("block must project exactly one column named '{expected}' (found {found} columns)")]
    ProjectionArity { expected: &'static str, found: usize },
    #[error("block projects column '{found}' where '{expected}' is required")]
    ProjectionName { expected: &'static str, found: String },
}
