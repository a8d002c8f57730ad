use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SchemaAnalyzerError {
    #[error("relation {object_type}.{relation} references unknown relation '{referenced}' (run schema validation before analysis)")]
    UnknownRelation {
        object_type: String,
        relation: String,
        referenced: String,
    },
    #[error("relation {object_type}.{relation} has an unsupported rewrite shape: {detail}")]
    UnsupportedRewrite {
        object_type: String,
        relation: String,
        detail: String,
    },
    #[error("relation {object_type}.{relation} produced an intersection group with zero parts")]
    EmptyIntersectionGroup {
        object_type: String,
        relation: String,
    },
}
