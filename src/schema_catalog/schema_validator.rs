//! Cross-reference validation, run once before analysis.
//!
//! Catches every dangling reference a schema document can carry so the
//! analyzer can assume lookups succeed: unknown subject types, unknown
//! relations behind `computed_userset` / `tuple_to_userset` / userset
//! refs, empty unions and intersections, contradictory subject refs.

use super::errors::SchemaCatalogError;
use super::schema_types::{RewriteExpr, SubjectTypeRef};
use super::SchemaCatalog;

/// Validate every relation in the catalog. Returns the first violation.
pub fn validate(catalog: &SchemaCatalog) -> Result<(), SchemaCatalogError> {
    for type_def in catalog.types() {
        for relation_def in &type_def.relations {
            validate_rewrite(catalog, &type_def.name, &relation_def.name, &relation_def.rewrite)?;
        }
    }
    Ok(())
}

fn validate_rewrite(
    catalog: &SchemaCatalog,
    object_type: &str,
    relation: &str,
    rewrite: &RewriteExpr,
) -> Result<(), SchemaCatalogError> {
    match rewrite {
        RewriteExpr::Direct { subject_types } => {
            for subject_ref in subject_types {
                validate_subject_ref(catalog, object_type, relation, subject_ref)?;
            }
            Ok(())
        }
        RewriteExpr::ComputedUserset { relation: target } => {
            if !catalog.has_relation(object_type, target) {
                return Err(SchemaCatalogError::UnknownRelation {
                    object_type: object_type.to_string(),
                    relation: relation.to_string(),
                    referenced_type: object_type.to_string(),
                    referenced: target.clone(),
                });
            }
            Ok(())
        }
        RewriteExpr::TupleToUserset { tupleset, computed } => {
            let Some(tupleset_def) = catalog.get_relation(object_type, tupleset) else {
                return Err(SchemaCatalogError::UnknownRelation {
                    object_type: object_type.to_string(),
                    relation: relation.to_string(),
                    referenced_type: object_type.to_string(),
                    referenced: tupleset.clone(),
                });
            };
            let targets = link_target_types(&tupleset_def.rewrite);
            if targets.is_empty() {
                return Err(SchemaCatalogError::InvalidTuplesetSubjects {
                    object_type: object_type.to_string(),
                    relation: relation.to_string(),
                    tupleset: tupleset.clone(),
                });
            }
            for target_type in targets {
                if !catalog.has_relation(&target_type, computed) {
                    return Err(SchemaCatalogError::UnknownRelation {
                        object_type: object_type.to_string(),
                        relation: relation.to_string(),
                        referenced_type: target_type,
                        referenced: computed.clone(),
                    });
                }
            }
            Ok(())
        }
        RewriteExpr::Union { children } => {
            if children.is_empty() {
                return Err(SchemaCatalogError::EmptyCombination {
                    object_type: object_type.to_string(),
                    relation: relation.to_string(),
                    kind: "union",
                });
            }
            for child in children {
                validate_rewrite(catalog, object_type, relation, child)?;
            }
            Ok(())
        }
        RewriteExpr::Intersection { children } => {
            if children.is_empty() {
                return Err(SchemaCatalogError::EmptyCombination {
                    object_type: object_type.to_string(),
                    relation: relation.to_string(),
                    kind: "intersection",
                });
            }
            for child in children {
                validate_rewrite(catalog, object_type, relation, child)?;
            }
            Ok(())
        }
        RewriteExpr::Exclusion { base, subtract } => {
            validate_rewrite(catalog, object_type, relation, base)?;
            validate_rewrite(catalog, object_type, relation, subtract)
        }
    }
}

fn validate_subject_ref(
    catalog: &SchemaCatalog,
    object_type: &str,
    relation: &str,
    subject_ref: &SubjectTypeRef,
) -> Result<(), SchemaCatalogError> {
    if !catalog.has_type(&subject_ref.subject_type) {
        return Err(SchemaCatalogError::UnknownObjectType {
            object_type: object_type.to_string(),
            relation: relation.to_string(),
            referenced: subject_ref.subject_type.clone(),
        });
    }
    if subject_ref.wildcard && subject_ref.relation.is_some() {
        return Err(SchemaCatalogError::WildcardWithRelation {
            object_type: object_type.to_string(),
            relation: relation.to_string(),
            subject_type: subject_ref.subject_type.clone(),
        });
    }
    if let Some(subject_relation) = &subject_ref.relation {
        if !catalog.has_relation(&subject_ref.subject_type, subject_relation) {
            return Err(SchemaCatalogError::UnknownRelation {
                object_type: object_type.to_string(),
                relation: relation.to_string(),
                referenced_type: subject_ref.subject_type.clone(),
                referenced: subject_relation.clone(),
            });
        }
    }
    Ok(())
}

/// The object types a linking (tupleset) relation can point at: the plain
/// subject types of its direct grants, looked through unions,
/// intersections and exclusion bases.
pub fn link_target_types(rewrite: &RewriteExpr) -> Vec<String> {
    let mut targets = Vec::new();
    collect_link_targets(rewrite, &mut targets);
    targets.sort();
    targets.dedup();
    targets
}

fn collect_link_targets(rewrite: &RewriteExpr, out: &mut Vec<String>) {
    match rewrite {
        RewriteExpr::Direct { subject_types } => {
            for subject_ref in subject_types {
                if !subject_ref.is_userset() && !subject_ref.wildcard {
                    out.push(subject_ref.subject_type.clone());
                }
            }
        }
        RewriteExpr::Union { children } | RewriteExpr::Intersection { children } => {
            for child in children {
                collect_link_targets(child, out);
            }
        }
        RewriteExpr::Exclusion { base, .. } => collect_link_targets(base, out),
        RewriteExpr::ComputedUserset { .. } | RewriteExpr::TupleToUserset { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::super::schema_types::test_support::*;
    use super::*;

    fn catalog(types: Vec<crate::schema_catalog::TypeDefinition>) -> SchemaCatalog {
        SchemaCatalog::build(document(types)).unwrap()
    }

    #[test]
    fn accepts_well_formed_schema() {
        let catalog = catalog(vec![
            type_def("user", vec![]),
            type_def(
                "folder",
                vec![
                    relation_def("parent", direct(vec![subject_ref("folder")])),
                    relation_def(
                        "viewer",
                        union(vec![direct(vec![subject_ref("user")]), ttu("parent", "viewer")]),
                    ),
                ],
            ),
        ]);
        assert!(validate(&catalog).is_ok());
    }

    #[test]
    fn rejects_unknown_subject_type() {
        let catalog = catalog(vec![type_def(
            "doc",
            vec![relation_def("viewer", direct(vec![subject_ref("ghost")]))],
        )]);
        let err = validate(&catalog).unwrap_err();
        assert!(matches!(
            err,
            SchemaCatalogError::UnknownObjectType { referenced, .. } if referenced == "ghost"
        ));
    }

    #[test]
    fn rejects_unknown_implied_relation() {
        let catalog = catalog(vec![
            type_def("user", vec![]),
            type_def("doc", vec![relation_def("viewer", implied("editor"))]),
        ]);
        let err = validate(&catalog).unwrap_err();
        assert!(matches!(
            err,
            SchemaCatalogError::UnknownRelation { referenced, .. } if referenced == "editor"
        ));
    }

    #[test]
    fn rejects_ttu_computed_missing_on_target() {
        let catalog = catalog(vec![
            type_def("user", vec![]),
            type_def("org", vec![relation_def("admin", direct(vec![subject_ref("user")]))]),
            type_def(
                "doc",
                vec![
                    relation_def("owner", direct(vec![subject_ref("org")])),
                    relation_def("viewer", ttu("owner", "missing")),
                ],
            ),
        ]);
        let err = validate(&catalog).unwrap_err();
        assert!(matches!(
            err,
            SchemaCatalogError::UnknownRelation { referenced_type, referenced, .. }
                if referenced_type == "org" && referenced == "missing"
        ));
    }

    #[test]
    fn rejects_empty_union() {
        let catalog = catalog(vec![type_def("doc", vec![relation_def("viewer", union(vec![]))])]);
        let err = validate(&catalog).unwrap_err();
        assert!(matches!(err, SchemaCatalogError::EmptyCombination { kind: "union", .. }));
    }

    #[test]
    fn rejects_wildcard_userset_combination() {
        let mut bad = userset_ref("group", "member");
        bad.wildcard = true;
        let catalog = catalog(vec![
            type_def("group", vec![relation_def("member", direct(vec![]))]),
            type_def("doc", vec![relation_def("viewer", direct(vec![bad]))]),
        ]);
        let err = validate(&catalog).unwrap_err();
        assert!(matches!(err, SchemaCatalogError::WildcardWithRelation { .. }));
    }

    #[test]
    fn link_targets_skip_usersets_and_wildcards() {
        let rewrite = union(vec![
            direct(vec![subject_ref("folder"), userset_ref("group", "member"), wildcard_ref("user")]),
            direct(vec![subject_ref("org")]),
        ]);
        assert_eq!(link_target_types(&rewrite), vec!["folder".to_string(), "org".to_string()]);
    }
}
