//! Schema-document loading.
//!
//! Documents are plain serde data (no DSL): YAML for hand-written
//! schemas, JSON for machine-produced ones. The format is chosen by file
//! extension.

use std::fs;
use std::path::Path;

use super::errors::SchemaCatalogError;
use super::schema_types::SchemaDocument;

/// Load a [`SchemaDocument`] from a `.yaml`/`.yml` or `.json` file.
pub fn load_schema_document(path: &Path) -> Result<SchemaDocument, SchemaCatalogError> {
    let contents = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "yaml" | "yml" => Ok(serde_yaml::from_str(&contents)?),
        "json" => Ok(serde_json::from_str(&contents)?),
        other => Err(SchemaCatalogError::UnsupportedExtension(other.to_string())),
    }
}
