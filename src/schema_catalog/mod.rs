//! Typed ReBAC schema model and pre-analysis validation.
//!
//! The catalog owns the schema document plus index maps from names to
//! positions, so the analyzer can follow implication and tuple-to-userset
//! edges (which may form cycles) through indices instead of owning
//! pointers.

use std::collections::HashMap;

pub mod config;
mod errors;
pub mod schema_types;
pub mod schema_validator;

pub use config::load_schema_document;
pub use errors::SchemaCatalogError;
pub use schema_types::{
    RelationDefinition, RewriteExpr, SchemaDocument, SubjectTypeRef, TypeDefinition,
};

/// Indexed, validated-for-shape schema. Reference validation (unknown
/// types/relations) is a separate pass in [`schema_validator`].
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    document: SchemaDocument,
    type_index: HashMap<String, usize>,
    relation_index: HashMap<(String, String), (usize, usize)>,
}

impl SchemaCatalog {
    /// Index a schema document. Rejects duplicate type or relation names;
    /// everything else is left to the validator.
    pub fn build(document: SchemaDocument) -> Result<Self, SchemaCatalogError> {
        let mut type_index = HashMap::new();
        let mut relation_index = HashMap::new();
        for (type_pos, type_def) in document.types.iter().enumerate() {
            if type_index.insert(type_def.name.clone(), type_pos).is_some() {
                return Err(SchemaCatalogError::DuplicateType(type_def.name.clone()));
            }
            for (relation_pos, relation_def) in type_def.relations.iter().enumerate() {
                let key = (type_def.name.clone(), relation_def.name.clone());
                if relation_index.insert(key, (type_pos, relation_pos)).is_some() {
                    return Err(SchemaCatalogError::DuplicateRelation {
                        object_type: type_def.name.clone(),
                        relation: relation_def.name.clone(),
                    });
                }
            }
        }
        Ok(Self {
            document,
            type_index,
            relation_index,
        })
    }

    pub fn document(&self) -> &SchemaDocument {
        &self.document
    }

    /// Type definitions in schema order.
    pub fn types(&self) -> &[TypeDefinition] {
        &self.document.types
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.type_index
            .get(name)
            .map(|&pos| &self.document.types[pos])
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.type_index.contains_key(name)
    }

    pub fn get_relation(&self, object_type: &str, relation: &str) -> Option<&RelationDefinition> {
        self.relation_index
            .get(&(object_type.to_string(), relation.to_string()))
            .map(|&(type_pos, relation_pos)| {
                &self.document.types[type_pos].relations[relation_pos]
            })
    }

    pub fn has_relation(&self, object_type: &str, relation: &str) -> bool {
        self.relation_index
            .contains_key(&(object_type.to_string(), relation.to_string()))
    }

    /// `(object_type, relation)` pairs in schema (insertion) order.
    pub fn relation_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for type_def in &self.document.types {
            for relation_def in &type_def.relations {
                pairs.push((type_def.name.clone(), relation_def.name.clone()));
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::schema_types::test_support::*;
    use super::*;

    #[test]
    fn build_indexes_types_and_relations() {
        let catalog = SchemaCatalog::build(document(vec![
            type_def("user", vec![]),
            type_def("doc", vec![relation_def("viewer", direct(vec![subject_ref("user")]))]),
        ]))
        .unwrap();
        assert!(catalog.has_type("user"));
        assert!(catalog.has_relation("doc", "viewer"));
        assert!(!catalog.has_relation("doc", "editor"));
        assert_eq!(
            catalog.relation_pairs(),
            vec![("doc".to_string(), "viewer".to_string())]
        );
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let err = SchemaCatalog::build(document(vec![
            type_def("user", vec![]),
            type_def("user", vec![]),
        ]))
        .unwrap_err();
        assert!(matches!(err, SchemaCatalogError::DuplicateType(name) if name == "user"));
    }

    #[test]
    fn duplicate_relation_is_rejected() {
        let err = SchemaCatalog::build(document(vec![type_def(
            "doc",
            vec![
                relation_def("viewer", direct(vec![subject_ref("user")])),
                relation_def("viewer", direct(vec![subject_ref("user")])),
            ],
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            SchemaCatalogError::DuplicateRelation { object_type, relation }
                if object_type == "doc" && relation == "viewer"
        ));
    }
}
