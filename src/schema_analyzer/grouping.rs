//! Lowering of rewrite shapes into analysis structures: TTU parents,
//! intersection groups and classified exclusion branches.

use std::collections::BTreeMap;

use crate::schema_catalog::{schema_validator, RewriteExpr, SchemaCatalog, SubjectTypeRef};

use super::analysis::{
    ExclusionBranch, ExclusionConfig, IntersectionGroup, IntersectionPart, IntersectionPartKind,
    ParentRelation,
};
use super::closure::RelationFeatures;
use super::errors::SchemaAnalyzerError;
use super::feature_walk::LocalFeatures;

/// Shared read-only state for the analysis passes.
pub(crate) struct AnalyzerContext<'a> {
    pub catalog: &'a SchemaCatalog,
    pub locals: &'a RelationFeatures,
    pub closures: &'a BTreeMap<(String, String), Vec<String>>,
}

impl AnalyzerContext<'_> {
    pub fn closure_of(&self, object_type: &str, relation: &str) -> &[String] {
        self.closures
            .get(&(object_type.to_string(), relation.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn member_features(&self, object_type: &str, relation: &str) -> Vec<&LocalFeatures> {
        self.closure_of(object_type, relation)
            .iter()
            .filter_map(|member| {
                self.locals
                    .get(&(object_type.to_string(), member.clone()))
            })
            .collect()
    }

    /// Any closure member stores direct grants (userset refs count).
    pub fn closure_has_direct(&self, object_type: &str, relation: &str) -> bool {
        self.member_features(object_type, relation)
            .iter()
            .any(|f| f.has_direct())
    }

    pub fn closure_has_wildcard(&self, object_type: &str, relation: &str) -> bool {
        self.member_features(object_type, relation)
            .iter()
            .any(|f| f.has_wildcard())
    }

    /// Any closure member carries userset/TTU/intersection/exclusion.
    pub fn closure_is_complex(&self, object_type: &str, relation: &str) -> bool {
        self.member_features(object_type, relation)
            .iter()
            .any(|f| f.is_complex())
    }

    /// Self plus the simple closure members, sorted.
    pub fn direct_lookup_relations(&self, object_type: &str, relation: &str) -> Vec<String> {
        let mut relations: Vec<String> = vec![relation.to_string()];
        for member in self.closure_of(object_type, relation) {
            if member == relation {
                continue;
            }
            if let Some(features) = self
                .locals
                .get(&(object_type.to_string(), member.clone()))
            {
                if !features.is_complex() {
                    relations.push(member.clone());
                }
            }
        }
        relations.sort();
        relations.dedup();
        relations
    }

    /// Types the linking relation's tuples can point at.
    pub fn link_target_types(&self, object_type: &str, tupleset: &str) -> Vec<String> {
        self.catalog
            .get_relation(object_type, tupleset)
            .map(|def| schema_validator::link_target_types(&def.rewrite))
            .unwrap_or_default()
    }
}

pub(crate) fn build_parent_relation(
    ctx: &AnalyzerContext<'_>,
    object_type: &str,
    tupleset: &str,
    computed: &str,
) -> ParentRelation {
    let target_types = ctx.link_target_types(object_type, tupleset);
    let has_self = target_types.iter().any(|t| t == object_type);
    let has_cross = target_types.iter().any(|t| t != object_type);
    ParentRelation {
        linking_relation: tupleset.to_string(),
        target_relation: computed.to_string(),
        target_types,
        has_cross_type_link: has_cross,
        has_self_referential_link: has_self,
    }
}

/// Classify one exclusion subtract into its disjunctive branches.
pub(crate) fn classify_exclusion(
    ctx: &AnalyzerContext<'_>,
    object_type: &str,
    relation: &str,
    subtract: &RewriteExpr,
) -> Result<Vec<ExclusionBranch>, SchemaAnalyzerError> {
    match subtract {
        RewriteExpr::ComputedUserset { relation: excluded } => {
            if ctx.closure_is_complex(object_type, excluded) {
                Ok(vec![ExclusionBranch::Complex {
                    relation: excluded.clone(),
                }])
            } else {
                Ok(vec![ExclusionBranch::Simple {
                    relations: ctx.direct_lookup_relations(object_type, excluded),
                    has_wildcard: ctx.closure_has_wildcard(object_type, excluded),
                }])
            }
        }
        RewriteExpr::TupleToUserset { tupleset, computed } => Ok(vec![
            ExclusionBranch::TupleToUserset(build_parent_relation(
                ctx,
                object_type,
                tupleset,
                computed,
            )),
        ]),
        RewriteExpr::Intersection { children } => {
            let group = build_intersection_group(ctx, object_type, relation, children)?;
            Ok(vec![ExclusionBranch::Intersection(group)])
        }
        RewriteExpr::Union { children } => {
            let mut branches = Vec::new();
            for child in children {
                branches.extend(classify_exclusion(ctx, object_type, relation, child)?);
            }
            Ok(branches)
        }
        RewriteExpr::Direct { .. } => Err(SchemaAnalyzerError::UnsupportedRewrite {
            object_type: object_type.to_string(),
            relation: relation.to_string(),
            detail: "exclusion subtract must reference a relation, not a direct grant".to_string(),
        }),
        RewriteExpr::Exclusion { .. } => Err(SchemaAnalyzerError::UnsupportedRewrite {
            object_type: object_type.to_string(),
            relation: relation.to_string(),
            detail: "nested exclusion inside an exclusion subtract".to_string(),
        }),
    }
}

pub(crate) fn build_exclusion_config(
    ctx: &AnalyzerContext<'_>,
    object_type: &str,
    relation: &str,
    subtracts: &[RewriteExpr],
) -> Result<ExclusionConfig, SchemaAnalyzerError> {
    let mut branches = Vec::new();
    for subtract in subtracts {
        branches.extend(classify_exclusion(ctx, object_type, relation, subtract)?);
    }
    Ok(ExclusionConfig { branches })
}

/// Lower one intersection node's children into ordered parts. Nested
/// intersections flatten into the same group; nested unions of direct
/// grants merge into one `this` part.
pub(crate) fn build_intersection_group(
    ctx: &AnalyzerContext<'_>,
    object_type: &str,
    relation: &str,
    children: &[RewriteExpr],
) -> Result<IntersectionGroup, SchemaAnalyzerError> {
    let mut parts = Vec::new();
    collect_parts(ctx, object_type, relation, children, &mut parts)?;
    if parts.is_empty() {
        return Err(SchemaAnalyzerError::EmptyIntersectionGroup {
            object_type: object_type.to_string(),
            relation: relation.to_string(),
        });
    }
    Ok(IntersectionGroup { parts })
}

fn collect_parts(
    ctx: &AnalyzerContext<'_>,
    object_type: &str,
    relation: &str,
    children: &[RewriteExpr],
    parts: &mut Vec<IntersectionPart>,
) -> Result<(), SchemaAnalyzerError> {
    for child in children {
        match child {
            RewriteExpr::Intersection { children } => {
                collect_parts(ctx, object_type, relation, children, parts)?;
            }
            RewriteExpr::Exclusion { base, subtract } => {
                let kind = part_kind(ctx, object_type, relation, base)?;
                let but_not = build_exclusion_config(
                    ctx,
                    object_type,
                    relation,
                    std::slice::from_ref(subtract.as_ref()),
                )?;
                parts.push(IntersectionPart {
                    kind,
                    but_not: Some(but_not),
                });
            }
            other => {
                parts.push(IntersectionPart {
                    kind: part_kind(ctx, object_type, relation, other)?,
                    but_not: None,
                });
            }
        }
    }
    Ok(())
}

fn part_kind(
    ctx: &AnalyzerContext<'_>,
    object_type: &str,
    relation: &str,
    rewrite: &RewriteExpr,
) -> Result<IntersectionPartKind, SchemaAnalyzerError> {
    match rewrite {
        RewriteExpr::Direct { subject_types } => direct_part(object_type, relation, subject_types),
        RewriteExpr::ComputedUserset { relation: target } => {
            Ok(IntersectionPartKind::ComputedUserset {
                relation: target.clone(),
                satisfying_relations: ctx.direct_lookup_relations(object_type, target),
                has_wildcard: ctx.closure_has_wildcard(object_type, target),
                is_complex: ctx.closure_is_complex(object_type, target),
            })
        }
        RewriteExpr::TupleToUserset { tupleset, computed } => Ok(
            IntersectionPartKind::TupleToUserset(build_parent_relation(
                ctx,
                object_type,
                tupleset,
                computed,
            )),
        ),
        RewriteExpr::Union { children } => {
            // Only a union of direct grants folds into a single part.
            let mut refs = Vec::new();
            for child in children {
                match child {
                    RewriteExpr::Direct { subject_types } => refs.extend(subject_types.clone()),
                    _ => {
                        return Err(SchemaAnalyzerError::UnsupportedRewrite {
                            object_type: object_type.to_string(),
                            relation: relation.to_string(),
                            detail: "union inside an intersection part may only contain direct grants".to_string(),
                        })
                    }
                }
            }
            direct_part(object_type, relation, &refs)
        }
        RewriteExpr::Intersection { .. } | RewriteExpr::Exclusion { .. } => {
            Err(SchemaAnalyzerError::UnsupportedRewrite {
                object_type: object_type.to_string(),
                relation: relation.to_string(),
                detail: "intersection part nests an unsupported combination".to_string(),
            })
        }
    }
}

fn direct_part(
    object_type: &str,
    relation: &str,
    subject_types: &[SubjectTypeRef],
) -> Result<IntersectionPartKind, SchemaAnalyzerError> {
    if subject_types.iter().any(|r| r.is_userset()) {
        return Err(SchemaAnalyzerError::UnsupportedRewrite {
            object_type: object_type.to_string(),
            relation: relation.to_string(),
            detail: "userset subject reference inside an intersection part".to_string(),
        });
    }
    let mut types: Vec<String> = subject_types.iter().map(|r| r.subject_type.clone()).collect();
    types.sort();
    types.dedup();
    Ok(IntersectionPartKind::Direct {
        relations: vec![relation.to_string()],
        subject_types: types,
        has_wildcard: subject_types.iter().any(|r| r.wildcard),
    })
}
