//! Schema analysis: one [`RelationAnalysis`] per `(object_type, relation)`.
//!
//! The passes run in dependency order over the whole schema: local
//! feature walks, the shared implication-closure fixpoint, then
//! per-relation derivation (patterns, parents, groups, exclusions,
//! anchors, depth, capabilities, strategy). Iteration over schema members
//! uses insertion order; every derived set is sorted, so the output is
//! independent of map iteration order.

use std::collections::BTreeMap;

use log::debug;

pub mod analysis;
pub mod anchor;
pub mod closure;
mod errors;
pub mod feature_walk;
mod grouping;
mod strategy;
pub mod userset_depth;

#[cfg(test)]
mod analyzer_tests;

pub use analysis::{
    AnchorStep, AnchorStepKind, Capabilities, ExclusionBranch, ExclusionConfig, IntersectionGroup,
    IntersectionPart, IntersectionPartKind, ListStrategy, ParentRelation, RelationAnalysis,
    UsersetPattern,
};
pub use errors::SchemaAnalyzerError;

use crate::schema_catalog::SchemaCatalog;

use anchor::{AnchorEdges, AnchorGraph};
use closure::RelationFeatures;
use feature_walk::{walk_rewrite, LocalFeatures};
use grouping::AnalyzerContext;

/// Analyses in schema order plus a `(type, relation)` lookup index.
#[derive(Debug, Clone)]
pub struct AnalysisSet {
    analyses: Vec<RelationAnalysis>,
    index: BTreeMap<(String, String), usize>,
}

impl AnalysisSet {
    fn build(analyses: Vec<RelationAnalysis>) -> Self {
        let index = analyses
            .iter()
            .enumerate()
            .map(|(pos, a)| ((a.object_type.clone(), a.relation.clone()), pos))
            .collect();
        Self { analyses, index }
    }

    pub fn analyses(&self) -> &[RelationAnalysis] {
        &self.analyses
    }

    pub fn get(&self, object_type: &str, relation: &str) -> Option<&RelationAnalysis> {
        self.index
            .get(&(object_type.to_string(), relation.to_string()))
            .map(|&pos| &self.analyses[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelationAnalysis> {
        self.analyses.iter()
    }

    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }
}

/// Analyze every relation of a validated catalog.
pub fn analyze(catalog: &SchemaCatalog) -> Result<AnalysisSet, SchemaAnalyzerError> {
    let pairs = catalog.relation_pairs();

    // Pass 1: local feature walks.
    let mut locals: RelationFeatures = BTreeMap::new();
    for (object_type, relation) in &pairs {
        let definition = catalog
            .get_relation(object_type, relation)
            .expect("relation pairs come from the catalog");
        locals.insert(
            (object_type.clone(), relation.clone()),
            walk_rewrite(&definition.rewrite),
        );
    }

    // Pass 2: shared closure fixpoint.
    let mut closures: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for (object_type, relation) in &pairs {
        closures.insert(
            (object_type.clone(), relation.clone()),
            closure::satisfying_relations(object_type, relation, &locals),
        );
    }

    let ctx = AnalyzerContext {
        catalog,
        locals: &locals,
        closures: &closures,
    };

    // Pass 3: whole-schema graphs for depth and anchor search.
    let userset_edges = build_userset_edges(&ctx, &pairs);
    let anchor_graph = build_anchor_graph(&ctx, &pairs);

    // Pass 4: per-relation derivation, in schema order.
    let mut analyses = Vec::with_capacity(pairs.len());
    for (object_type, relation) in &pairs {
        analyses.push(analyze_relation(
            &ctx,
            &userset_edges,
            &anchor_graph,
            object_type,
            relation,
        )?);
    }
    Ok(AnalysisSet::build(analyses))
}

/// Userset refs contributed by the whole closure of one relation, in
/// closure order, deduplicated.
fn closure_userset_refs(
    ctx: &AnalyzerContext<'_>,
    object_type: &str,
    relation: &str,
) -> Vec<(String, String, String)> {
    let mut refs: Vec<(String, String, String)> = Vec::new();
    for member in ctx.closure_of(object_type, relation) {
        let Some(features) = member_features(ctx, object_type, member) else {
            continue;
        };
        for (subject_type, subject_relation) in features.userset_refs() {
            if !refs
                .iter()
                .any(|(t, r, _)| t == &subject_type && r == &subject_relation)
            {
                refs.push((subject_type, subject_relation, member.clone()));
            }
        }
    }
    refs
}

fn member_features<'a>(
    ctx: &AnalyzerContext<'a>,
    object_type: &str,
    relation: &str,
) -> Option<&'a LocalFeatures> {
    ctx.locals
        .get(&(object_type.to_string(), relation.to_string()))
}

fn build_userset_edges(
    ctx: &AnalyzerContext<'_>,
    pairs: &[(String, String)],
) -> userset_depth::UsersetEdges {
    let mut edges = userset_depth::UsersetEdges::new();
    for (object_type, relation) in pairs {
        let targets: Vec<(String, String)> = closure_userset_refs(ctx, object_type, relation)
            .into_iter()
            .map(|(t, r, _)| (t, r))
            .collect();
        if !targets.is_empty() {
            edges.insert((object_type.clone(), relation.clone()), targets);
        }
    }
    edges
}

fn build_anchor_graph(ctx: &AnalyzerContext<'_>, pairs: &[(String, String)]) -> AnchorGraph {
    let mut graph = AnchorGraph::new();
    for (object_type, relation) in pairs {
        let mut edges = AnchorEdges::default();
        for member in ctx.closure_of(object_type, relation) {
            let Some(features) = member_features(ctx, object_type, member) else {
                continue;
            };
            for (tupleset, computed) in &features.ttu_refs {
                let target_types = ctx.link_target_types(object_type, tupleset);
                if !target_types.is_empty() {
                    edges
                        .ttu
                        .push((tupleset.clone(), computed.clone(), target_types));
                }
            }
        }
        for (subject_type, subject_relation, _) in closure_userset_refs(ctx, object_type, relation)
        {
            edges.userset.push((subject_type, subject_relation));
        }
        if !edges.ttu.is_empty() || !edges.userset.is_empty() {
            graph.insert((object_type.clone(), relation.clone()), edges);
        }
    }
    graph
}

fn build_userset_pattern(
    ctx: &AnalyzerContext<'_>,
    subject_type: &str,
    subject_relation: &str,
    source_relation: &str,
) -> UsersetPattern {
    let mut satisfying = ctx.closure_of(subject_type, subject_relation).to_vec();
    if satisfying.is_empty() {
        satisfying.push(subject_relation.to_string());
    }
    UsersetPattern {
        subject_type: subject_type.to_string(),
        subject_relation: subject_relation.to_string(),
        satisfying_relations: satisfying,
        has_wildcard: ctx.closure_has_wildcard(subject_type, subject_relation),
        is_complex: ctx.closure_is_complex(subject_type, subject_relation),
        source_relation: source_relation.to_string(),
    }
}

fn analyze_relation(
    ctx: &AnalyzerContext<'_>,
    userset_edges: &userset_depth::UsersetEdges,
    anchor_graph: &AnchorGraph,
    object_type: &str,
    relation: &str,
) -> Result<RelationAnalysis, SchemaAnalyzerError> {
    let features = member_features(ctx, object_type, relation)
        .cloned()
        .unwrap_or_default();
    let closure = ctx.closure_of(object_type, relation).to_vec();
    let partition = closure::partition_closure(object_type, relation, &closure, ctx.locals);

    // Closure-wide propagation.
    let mut allowed_subject_types: Vec<String> = Vec::new();
    let mut closure_has_direct = false;
    let mut has_wildcard = false;
    for member in &closure {
        if let Some(member_features) = member_features(ctx, object_type, member) {
            allowed_subject_types.extend(member_features.plain_subject_types());
            closure_has_direct |= member_features.has_direct();
            has_wildcard |= member_features.has_wildcard();
        }
    }
    allowed_subject_types.sort();
    allowed_subject_types.dedup();

    let userset_patterns: Vec<UsersetPattern> = features
        .userset_refs()
        .into_iter()
        .map(|(subject_type, subject_relation)| {
            build_userset_pattern(ctx, &subject_type, &subject_relation, relation)
        })
        .collect();
    let closure_userset_patterns: Vec<UsersetPattern> =
        closure_userset_refs(ctx, object_type, relation)
            .into_iter()
            .map(|(subject_type, subject_relation, source)| {
                build_userset_pattern(ctx, &subject_type, &subject_relation, &source)
            })
            .collect();

    let parent_relations: Vec<ParentRelation> = features
        .ttu_refs
        .iter()
        .map(|(tupleset, computed)| {
            grouping::build_parent_relation(ctx, object_type, tupleset, computed)
        })
        .collect();

    let mut intersection_groups = Vec::new();
    for children in &features.intersection_children {
        intersection_groups.push(grouping::build_intersection_group(
            ctx,
            object_type,
            relation,
            children,
        )?);
    }

    let exclusions =
        grouping::build_exclusion_config(ctx, object_type, relation, &features.exclusion_subtracts)?;

    let max_depth = userset_depth::max_userset_depth(
        &(object_type.to_string(), relation.to_string()),
        userset_edges,
    );

    let indirect_anchor = anchor::compute_indirect_anchor(
        &(object_type.to_string(), relation.to_string()),
        anchor_graph,
        |node| ctx.closure_has_direct(&node.0, &node.1),
    );

    let has_recursive = parent_relations.iter().any(|p| p.has_self_referential_link);

    let (capabilities, list_strategy) = strategy::decide(&strategy::StrategyInputs {
        object_type,
        relation,
        has_intersection: features.contains_intersection,
        has_direct: features.has_direct(),
        has_implied: features.has_implied(),
        max_userset_depth: max_depth,
        closure_userset_patterns: &closure_userset_patterns,
        parent_relations: &parent_relations,
        indirect_anchor: &indirect_anchor,
        closure_has_direct,
    });

    debug!(
        "analyzed {}.{}: strategy={:?} closure={} simple={} complex={} list_allowed={}",
        object_type,
        relation,
        list_strategy,
        closure.len(),
        partition.simple.len(),
        partition.complex.len(),
        capabilities.list_allowed,
    );

    Ok(RelationAnalysis {
        object_type: object_type.to_string(),
        relation: relation.to_string(),
        has_direct: features.has_direct(),
        has_implied: features.has_implied(),
        has_wildcard,
        has_userset: features.contains_userset,
        has_ttu: features.contains_ttu,
        has_exclusion: features.contains_exclusion,
        has_intersection: features.contains_intersection,
        has_recursive,
        simple_closure_relations: partition.simple,
        complex_closure_relations: partition.complex,
        intersection_closure_relations: partition.intersectional,
        allowed_subject_types,
        closure_has_direct,
        userset_patterns,
        closure_userset_patterns,
        parent_relations,
        intersection_groups,
        exclusions,
        indirect_anchor,
        max_userset_depth: max_depth,
        capabilities,
        list_strategy,
    })
}
