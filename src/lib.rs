//! Melange - ReBAC schema compiler for PostgreSQL
//!
//! This crate compiles a relationship-based access-control schema into
//! specialised PL/pgSQL functions over a single tuple table through:
//! - A typed schema catalog with reference validation
//! - Per-relation analysis (closures, userset patterns, TTU parents,
//!   intersections, exclusions, anchors, strategies)
//! - A typed SQL + PL/pgSQL intermediate representation
//! - Check and list function generation with cursor pagination
//! - Dispatchers routing by `(object_type, relation)`

use thiserror::Error;

pub mod check_generator;
pub mod config;
pub mod inline_data;
pub mod list_generator;
pub mod schema_analyzer;
pub mod schema_catalog;
pub mod sql_generator;
pub mod sql_ir;
pub mod utils;

pub use config::CompilerOptions;
pub use inline_data::{build_inline_data, InlineData};
pub use schema_analyzer::{analyze, AnalysisSet, RelationAnalysis};
pub use schema_catalog::{load_schema_document, SchemaCatalog, SchemaDocument};
pub use sql_generator::{
    collect_function_names, generate, generate_with_options, GeneratedSql, GenerationSummary,
};

/// Any failure along the validate → analyze → generate pipeline.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("schema error: {0}")]
    Schema(#[from] schema_catalog::SchemaCatalogError),
    #[error("analysis error: {0}")]
    Analysis(#[from] schema_analyzer::SchemaAnalyzerError),
    #[error("generation error: {0}")]
    Generation(#[from] sql_generator::SqlGeneratorError),
}

/// Compile a schema document end to end.
pub fn compile_document(
    document: SchemaDocument,
    options: &CompilerOptions,
) -> Result<GeneratedSql, CompileError> {
    let catalog = SchemaCatalog::build(document)?;
    schema_catalog::schema_validator::validate(&catalog)?;
    let analyses = analyze(&catalog)?;
    let inline = build_inline_data(&analyses);
    Ok(generate_with_options(&analyses, &inline, options)?)
}

/// The function-name catalogue for a schema document, without
/// generating any SQL.
pub fn compile_function_names(document: SchemaDocument) -> Result<Vec<String>, CompileError> {
    let catalog = SchemaCatalog::build(document)?;
    schema_catalog::schema_validator::validate(&catalog)?;
    let analyses = analyze(&catalog)?;
    Ok(collect_function_names(&analyses))
}
