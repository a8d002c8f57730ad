//! Schema model types.
//!
//! A schema document pairs object types with relation definitions whose
//! rewrite expressions describe how the relation is granted. The model is
//! serde-driven so documents load from YAML or JSON:
//!
//! ```yaml
//! types:
//!   - name: doc
//!     relations:
//!       - name: viewer
//!         rewrite:
//!           union:
//!             children:
//!               - direct:
//!                   subject_types:
//!                     - type: user
//!                     - type: group
//!                       relation: member
//!               - computed_userset:
//!                   relation: editor
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub types: Vec<TypeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,
    pub rewrite: RewriteExpr,
}

/// A reference to the subjects a direct grant admits.
///
/// `relation: Some("member")` makes this a userset reference
/// (`group#member`); `wildcard: true` admits the `*` subject of that
/// type. The two are mutually exclusive (enforced by the validator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectTypeRef {
    #[serde(rename = "type")]
    pub subject_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub wildcard: bool,
}

impl SubjectTypeRef {
    pub fn is_userset(&self) -> bool {
        self.relation.is_some()
    }
}

/// Rewrite expression of a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteExpr {
    /// Direct grants from stored tuples.
    Direct { subject_types: Vec<SubjectTypeRef> },
    /// Holding `relation` on the same object grants this relation.
    ComputedUserset { relation: String },
    /// `computed from tupleset`: holding `computed` on an object linked
    /// through the `tupleset` relation grants this relation.
    TupleToUserset { tupleset: String, computed: String },
    Union { children: Vec<RewriteExpr> },
    Intersection { children: Vec<RewriteExpr> },
    /// `base but not subtract`.
    Exclusion {
        base: Box<RewriteExpr>,
        subtract: Box<RewriteExpr>,
    },
}

impl RewriteExpr {
    /// True when the rewrite is pure direct / implication / union of those
    /// — the shapes a plain tuple lookup can answer.
    pub fn is_simple(&self) -> bool {
        match self {
            RewriteExpr::Direct { subject_types } => {
                subject_types.iter().all(|s| !s.is_userset())
            }
            RewriteExpr::ComputedUserset { .. } => true,
            RewriteExpr::Union { children } => children.iter().all(|c| c.is_simple()),
            RewriteExpr::TupleToUserset { .. }
            | RewriteExpr::Intersection { .. }
            | RewriteExpr::Exclusion { .. } => false,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn simple_classification() {
        assert!(direct(vec![subject_ref("user")]).is_simple());
        assert!(implied("editor").is_simple());
        assert!(union(vec![direct(vec![subject_ref("user")]), implied("editor")]).is_simple());

        assert!(!direct(vec![userset_ref("group", "member")]).is_simple());
        assert!(!ttu("parent", "viewer").is_simple());
        assert!(!but_not(direct(vec![subject_ref("user")]), implied("blocked")).is_simple());
    }

    #[test]
    fn yaml_round_trip() {
        let doc = document(vec![type_def(
            "doc",
            vec![relation_def(
                "viewer",
                union(vec![
                    direct(vec![subject_ref("user"), userset_ref("group", "member")]),
                    implied("editor"),
                    ttu("parent", "viewer"),
                ]),
            )],
        )]);
        let yaml = serde_yaml::to_string(&doc).unwrap();
        let parsed: SchemaDocument = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn yaml_wildcard_and_exclusion_parse() {
        let yaml = r#"
types:
  - name: user
  - name: doc
    relations:
      - name: blocked
        rewrite:
          direct:
            subject_types:
              - type: user
      - name: viewer
        rewrite:
          exclusion:
            base:
              direct:
                subject_types:
                  - type: user
                    wildcard: true
            subtract:
              computed_userset:
                relation: blocked
"#;
        let parsed: SchemaDocument = serde_yaml::from_str(yaml).unwrap();
        let viewer = &parsed.types[1].relations[1];
        match &viewer.rewrite {
            RewriteExpr::Exclusion { base, subtract } => {
                match base.as_ref() {
                    RewriteExpr::Direct { subject_types } => {
                        assert!(subject_types[0].wildcard);
                    }
                    other => panic!("unexpected base: {:?}", other),
                }
                assert_eq!(
                    subtract.as_ref(),
                    &RewriteExpr::ComputedUserset {
                        relation: "blocked".to_string()
                    }
                );
            }
            other => panic!("unexpected rewrite: {:?}", other),
        }
    }
}
