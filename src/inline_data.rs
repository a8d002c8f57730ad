//! Inline `VALUES` data derived from the analyses.
//!
//! Two tables: the closure table (which relations satisfy which) and the
//! userset-pattern table (which `type#relation` grants a relation admits,
//! together with the relations satisfying the pattern's target). Rows are
//! sorted at build time so every rendering is byte-stable.

use serde::{Deserialize, Serialize};

use crate::schema_analyzer::AnalysisSet;
use crate::sql_ir::{SqlExpr, TableExpr};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClosureRow {
    pub object_type: String,
    pub relation: String,
    pub satisfying_relation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsersetPatternRow {
    pub object_type: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_relation: String,
    pub satisfying_relation: String,
    pub has_wildcard: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InlineData {
    closure_rows: Vec<ClosureRow>,
    userset_rows: Vec<UsersetPatternRow>,
}

/// Flatten closures and userset patterns into sorted rows.
pub fn build_inline_data(analyses: &AnalysisSet) -> InlineData {
    let mut closure_rows = Vec::new();
    let mut userset_rows = Vec::new();

    for analysis in analyses.iter() {
        let mut satisfying: Vec<String> = analysis.direct_lookup_relations();
        satisfying.extend(analysis.complex_closure_relations.iter().cloned());
        satisfying.extend(analysis.intersection_closure_relations.iter().cloned());
        satisfying.sort();
        satisfying.dedup();
        for member in satisfying {
            closure_rows.push(ClosureRow {
                object_type: analysis.object_type.clone(),
                relation: analysis.relation.clone(),
                satisfying_relation: member,
            });
        }

        for pattern in &analysis.closure_userset_patterns {
            for satisfying_relation in &pattern.satisfying_relations {
                userset_rows.push(UsersetPatternRow {
                    object_type: analysis.object_type.clone(),
                    relation: analysis.relation.clone(),
                    subject_type: pattern.subject_type.clone(),
                    subject_relation: pattern.subject_relation.clone(),
                    satisfying_relation: satisfying_relation.clone(),
                    has_wildcard: pattern.has_wildcard,
                });
            }
        }
    }

    closure_rows.sort();
    closure_rows.dedup();
    userset_rows.sort();
    userset_rows.dedup();

    InlineData {
        closure_rows,
        userset_rows,
    }
}

impl InlineData {
    pub fn closure_rows(&self) -> &[ClosureRow] {
        &self.closure_rows
    }

    pub fn userset_rows(&self) -> &[UsersetPatternRow] {
        &self.userset_rows
    }

    /// Single-column `(satisfying_relation)` VALUES table for one
    /// relation's closure.
    pub fn closure_values(&self, object_type: &str, relation: &str, alias: &str) -> TableExpr {
        let rows: Vec<Vec<SqlExpr>> = self
            .closure_rows
            .iter()
            .filter(|row| row.object_type == object_type && row.relation == relation)
            .map(|row| vec![SqlExpr::string(row.satisfying_relation.clone())])
            .collect();
        TableExpr::values(alias, vec!["satisfying_relation".to_string()], rows)
            .expect("closure VALUES table has a declared column")
    }

    /// `(subject_type, subject_relation, satisfying_relation)` VALUES
    /// table for one relation's userset patterns.
    pub fn userset_pattern_values(
        &self,
        object_type: &str,
        relation: &str,
        alias: &str,
    ) -> TableExpr {
        let rows: Vec<Vec<SqlExpr>> = self
            .userset_rows
            .iter()
            .filter(|row| row.object_type == object_type && row.relation == relation)
            .map(|row| {
                vec![
                    SqlExpr::string(row.subject_type.clone()),
                    SqlExpr::string(row.subject_relation.clone()),
                    SqlExpr::string(row.satisfying_relation.clone()),
                ]
            })
            .collect();
        TableExpr::values(
            alias,
            vec![
                "subject_type".to_string(),
                "subject_relation".to_string(),
                "satisfying_relation".to_string(),
            ],
            rows,
        )
        .expect("userset VALUES table has declared columns")
    }
}
