use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaCatalogError {
    #[error("failed to read schema document: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML schema document: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse JSON schema document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema document extension '{0}' (expected .yaml, .yml or .json)")]
    UnsupportedExtension(String),
    #[error("duplicate type definition '{0}'")]
    DuplicateType(String),
    #[error("duplicate relation '{relation}' on type '{object_type}'")]
    DuplicateRelation {
        object_type: String,
        relation: String,
    },
    #[error("relation {object_type}.{relation} references unknown type '{referenced}'")]
    UnknownObjectType {
        object_type: String,
        relation: String,
        referenced: String,
    },
    #[error("relation {object_type}.{relation} references unknown relation '{referenced}' on type '{referenced_type}'")]
    UnknownRelation {
        object_type: String,
        relation: String,
        referenced_type: String,
        referenced: String,
    },
    #[error("relation {object_type}.{relation} has an empty {kind} (at least one branch required)")]
    EmptyCombination {
        object_type: String,
        relation: String,
        kind: &'static str,
    },
    #[error("relation {object_type}.{relation}: subject type '{subject_type}' cannot be both a wildcard and a userset reference")]
    WildcardWithRelation {
        object_type: String,
        relation: String,
        subject_type: String,
    },
    #[error("relation {object_type}.{relation}: tuple-to-userset over '{tupleset}' needs at least one non-userset subject type on the tupleset relation (link targets are object references)")]
    InvalidTuplesetSubjects {
        object_type: String,
        relation: String,
        tupleset: String,
    },
}
