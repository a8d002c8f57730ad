//! Top-level compilation: analyses + inline data → the four function
//! catalogues and the dispatchers, in deterministic order.

pub mod dispatcher;
mod errors;
pub mod function_names;

#[cfg(test)]
mod generator_tests;

pub use errors::SqlGeneratorError;
pub use function_names::collect_function_names;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::check_generator::build_check_function;
use crate::config::CompilerOptions;
use crate::inline_data::InlineData;
use crate::list_generator::{build_list_function, ListDirection, ListGeneratorError};
use crate::schema_analyzer::{AnalysisSet, RelationAnalysis};
use crate::sql_ir::ToSql;
use crate::utils::is_valid_emitted_identifier;

/// The emitted SQL, one string per function, catalogues ordered by
/// `(object_type, relation)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSql {
    pub check_functions: Vec<String>,
    pub no_wildcard_check_functions: Vec<String>,
    pub list_object_functions: Vec<String>,
    pub list_subject_functions: Vec<String>,
    pub check_dispatcher: String,
    pub no_wildcard_check_dispatcher: String,
    pub list_objects_dispatcher: String,
    pub list_subjects_dispatcher: String,
    pub summary: GenerationSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub relation_count: usize,
    pub check_function_count: usize,
    pub list_function_count: usize,
    /// `(object_type, relation, reason)` for relations whose list
    /// functions were skipped.
    pub skipped_list_relations: Vec<(String, String, String)>,
}

impl GeneratedSql {
    /// Concatenate everything into one migration script with section
    /// banners; byte-stable for identical inputs.
    pub fn to_script(&self) -> String {
        let mut script = String::new();
        let mut section = |title: &str, parts: &[String]| {
            if parts.is_empty() {
                return;
            }
            script.push_str(&format!("-- ==== {} ====\n\n", title));
            for part in parts {
                script.push_str(part);
                script.push('\n');
            }
        };
        section("check functions", &self.check_functions);
        section("check functions (no wildcard)", &self.no_wildcard_check_functions);
        section("list objects functions", &self.list_object_functions);
        section("list subjects functions", &self.list_subject_functions);
        section(
            "dispatchers",
            &[
                self.check_dispatcher.clone(),
                self.no_wildcard_check_dispatcher.clone(),
                self.list_objects_dispatcher.clone(),
                self.list_subjects_dispatcher.clone(),
            ],
        );
        script
    }
}

/// Generate with default options.
pub fn generate(
    analyses: &AnalysisSet,
    inline: &InlineData,
) -> Result<GeneratedSql, SqlGeneratorError> {
    generate_with_options(analyses, inline, &CompilerOptions::default())
}

pub fn generate_with_options(
    analyses: &AnalysisSet,
    inline: &InlineData,
    options: &CompilerOptions,
) -> Result<GeneratedSql, SqlGeneratorError> {
    let mut sorted: Vec<&RelationAnalysis> = analyses.iter().collect();
    sorted.sort_by(|a, b| {
        (a.object_type.as_str(), a.relation.as_str())
            .cmp(&(b.object_type.as_str(), b.relation.as_str()))
    });

    let mut generated = GeneratedSql {
        check_functions: Vec::new(),
        no_wildcard_check_functions: Vec::new(),
        list_object_functions: Vec::new(),
        list_subject_functions: Vec::new(),
        check_dispatcher: String::new(),
        no_wildcard_check_dispatcher: String::new(),
        list_objects_dispatcher: String::new(),
        list_subjects_dispatcher: String::new(),
        summary: GenerationSummary {
            relation_count: sorted.len(),
            ..GenerationSummary::default()
        },
    };

    for analysis in &sorted {
        let check = build_check_function(analysis, inline, false)?;
        assert_valid_name(&check.name)?;
        generated.check_functions.push(check.to_sql());
        generated.summary.check_function_count += 1;

        if options.emit_no_wildcard {
            let no_wildcard = build_check_function(analysis, inline, true)?;
            assert_valid_name(&no_wildcard.name)?;
            generated
                .no_wildcard_check_functions
                .push(no_wildcard.to_sql());
            generated.summary.check_function_count += 1;
        }

        for direction in [ListDirection::Objects, ListDirection::Subjects] {
            match build_list_function(analysis, inline, direction) {
                Ok(function) => {
                    assert_valid_name(&function.name)?;
                    let target = match direction {
                        ListDirection::Objects => &mut generated.list_object_functions,
                        ListDirection::Subjects => &mut generated.list_subject_functions,
                    };
                    target.push(function.to_sql());
                    generated.summary.list_function_count += 1;
                }
                Err(ListGeneratorError::ListNotAllowed {
                    object_type,
                    relation,
                }) => {
                    if options.strict {
                        return Err(SqlGeneratorError::UnsupportedCombination {
                            object_type,
                            relation,
                        });
                    }
                    warn!(
                        "skipping {:?} listing for {}.{}: no reachable grant path",
                        direction, object_type, relation
                    );
                    generated.summary.skipped_list_relations.push((
                        object_type,
                        relation,
                        "no reachable grant path".to_string(),
                    ));
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    generated.check_dispatcher = dispatcher::check_dispatcher_internal(&sorted, false).to_sql()
        + "\n"
        + &dispatcher::check_dispatcher_shim(false).to_sql();
    generated.no_wildcard_check_dispatcher = if options.emit_no_wildcard {
        dispatcher::check_dispatcher_internal(&sorted, true).to_sql()
            + "\n"
            + &dispatcher::check_dispatcher_shim(true).to_sql()
    } else {
        String::new()
    };
    generated.list_objects_dispatcher = dispatcher::list_objects_dispatcher(&sorted).to_sql();
    generated.list_subjects_dispatcher = dispatcher::list_subjects_dispatcher(&sorted).to_sql();

    debug!(
        "generated {} check and {} list functions over {} relations ({} listings skipped)",
        generated.summary.check_function_count,
        generated.summary.list_function_count,
        generated.summary.relation_count,
        generated.summary.skipped_list_relations.len(),
    );
    Ok(generated)
}

fn assert_valid_name(name: &str) -> Result<(), SqlGeneratorError> {
    if is_valid_emitted_identifier(name) {
        Ok(())
    } else {
        Err(SqlGeneratorError::InvalidFunctionName(name.to_string()))
    }
}
