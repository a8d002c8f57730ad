//! Recursive strategy: a depth-capped CTE over self-referential
//! tuple-to-userset links.
//!
//! Objects walk downwards (`accessible`): anything reachable from a
//! directly-granted object through child links. Subjects walk upwards
//! (`ancestors`): every ancestor of the queried object contributes its
//! grants. Cross-type links (and self-type links with a different target
//! relation) cannot ride the CTE and become per-row checked base blocks.

use crate::inline_data::InlineData;
use crate::schema_analyzer::ParentRelation;
use crate::sql_ir::{
    CteDefinition, JoinClause, PlpgsqlStmt, SelectStmt, SqlExpr, SqlQuery, TableExpr, UnionAll,
    MAX_RESOLUTION_DEPTH, TUPLES_TABLE,
};

use super::assembly::paginated_return;
use super::block_set::BlockSet;
use super::errors::ListGeneratorError;
use super::exclusion::{exclusion_predicate, ExclusionContext};
use super::plan::{ListDirection, ListPlan};
use super::shared_blocks::ListBlockBuilder;
use super::ListFunctionParts;

const ACCESSIBLE_CTE: &str = "accessible";
const ANCESTORS_CTE: &str = "ancestors";

pub(crate) fn build(
    plan: &ListPlan,
    inline: &InlineData,
) -> Result<ListFunctionParts, ListGeneratorError> {
    let builder = ListBlockBuilder::new(plan, inline);
    let stmt = match plan.direction {
        ListDirection::Objects => objects(plan, &builder)?,
        ListDirection::Subjects => subjects(plan, &builder)?,
    };
    Ok(ListFunctionParts {
        declarations: Vec::new(),
        body: vec![stmt],
    })
}

/// Linking relations the recursive step absorbs: self-type links whose
/// target is the listed relation itself.
fn recursive_linking_relations(plan: &ListPlan) -> Vec<String> {
    let mut relations: Vec<String> = plan
        .parent_relations
        .iter()
        .filter(|p| p.has_self_referential_link && p.target_relation == plan.relation)
        .map(|p| p.linking_relation.clone())
        .collect();
    relations.sort();
    relations.dedup();
    relations
}

/// TTU edges the CTE cannot absorb, reduced to per-edge check blocks:
/// `(linking, target_relation, leftover target types)`.
fn leftover_ttu_edges(plan: &ListPlan) -> Vec<(String, String, Vec<String>)> {
    let mut edges = Vec::new();
    for parent in &plan.parent_relations {
        let leftover: Vec<String> = leftover_targets(plan, parent);
        if !leftover.is_empty() {
            edges.push((
                parent.linking_relation.clone(),
                parent.target_relation.clone(),
                leftover,
            ));
        }
    }
    edges
}

fn leftover_targets(plan: &ListPlan, parent: &ParentRelation) -> Vec<String> {
    parent
        .target_types
        .iter()
        .filter(|target| {
            !(**target == plan.object_type && parent.target_relation == plan.relation)
        })
        .cloned()
        .collect()
}

fn objects(plan: &ListPlan, builder: &ListBlockBuilder<'_>) -> Result<PlpgsqlStmt, ListGeneratorError> {
    // Base term: every non-recursive way in, wrapped with depth 0.
    let mut base_set = builder.objects_block_set();
    for (linking, target_relation, targets) in leftover_ttu_edges(plan) {
        base_set.push(builder.ttu_check_objects_block(&linking, &target_relation, &targets));
    }
    if base_set.primary.is_empty() {
        return Err(ListGeneratorError::NoBlocks {
            object_type: plan.object_type.clone(),
            relation: plan.relation.clone(),
        });
    }
    let base_union = base_set.into_union()?;
    let base_term = SqlQuery::Select(SelectStmt {
        columns: vec![
            SqlExpr::column("base", "object_id"),
            SqlExpr::int(0).aliased("depth"),
        ],
        from: Some(TableExpr::subquery(base_union, "base")),
        ..SelectStmt::new()
    });

    let linking_relations = recursive_linking_relations(plan);
    let recursive_term = SqlQuery::Select(SelectStmt {
        columns: vec![
            SqlExpr::column("child", "object_id"),
            SqlExpr::column("a", "depth")
                .plus(SqlExpr::int(1))
                .aliased("depth"),
        ],
        from: Some(TableExpr::named_as(ACCESSIBLE_CTE, "a")),
        joins: vec![JoinClause::inner(
            TableExpr::named_as(TUPLES_TABLE, "child"),
            SqlExpr::and(vec![
                SqlExpr::column("child", "object_type").eq(SqlExpr::string(&plan.object_type)),
                SqlExpr::column("child", "relation")
                    .in_strings(linking_relations.iter().map(|r| r.to_string())),
                SqlExpr::column("child", "subject_type").eq(SqlExpr::string(&plan.object_type)),
                SqlExpr::column("child", "subject_id").eq(SqlExpr::column("a", "object_id")),
            ]),
        )],
        where_clause: Some(
            SqlExpr::column("a", "depth").lt(SqlExpr::int(MAX_RESOLUTION_DEPTH)),
        ),
        ..SelectStmt::new()
    });

    let accessible = CteDefinition::new(
        ACCESSIBLE_CTE,
        vec!["object_id".to_string(), "depth".to_string()],
        SqlQuery::Union(UnionAll::try_new(vec![base_term, recursive_term])?),
    );

    let final_col = SqlExpr::column(ACCESSIBLE_CTE, "object_id");
    let mut conditions = Vec::new();
    if let Some(excluded) = exclusion_predicate(
        plan,
        &plan.exclusions,
        &ExclusionContext::for_object(final_col.clone()),
    ) {
        conditions.push(excluded.negate());
    }
    let final_select = SqlQuery::Select(SelectStmt {
        distinct: true,
        columns: vec![final_col],
        from: Some(TableExpr::named(ACCESSIBLE_CTE)),
        where_clause: if conditions.is_empty() {
            None
        } else {
            Some(SqlExpr::and(conditions))
        },
        ..SelectStmt::new()
    });

    let mut set = BlockSet::new(ListDirection::Objects);
    set.push(final_select);
    paginated_return(plan, vec![accessible], true, set)
}

fn subjects(plan: &ListPlan, builder: &ListBlockBuilder<'_>) -> Result<PlpgsqlStmt, ListGeneratorError> {
    let linking_relations = recursive_linking_relations(plan);

    let base_term = SqlQuery::Select(SelectStmt {
        columns: vec![
            SqlExpr::param("p_object_id").aliased("object_id"),
            SqlExpr::int(0).aliased("depth"),
        ],
        ..SelectStmt::new()
    });
    let recursive_term = SqlQuery::Select(SelectStmt {
        columns: vec![
            SqlExpr::column("link", "subject_id").aliased("object_id"),
            SqlExpr::column("a", "depth")
                .plus(SqlExpr::int(1))
                .aliased("depth"),
        ],
        from: Some(TableExpr::named_as(ANCESTORS_CTE, "a")),
        joins: vec![JoinClause::inner(
            TableExpr::named_as(TUPLES_TABLE, "link"),
            SqlExpr::and(vec![
                SqlExpr::column("link", "object_type").eq(SqlExpr::string(&plan.object_type)),
                SqlExpr::column("link", "relation")
                    .in_strings(linking_relations.iter().map(|r| r.to_string())),
                SqlExpr::column("link", "object_id").eq(SqlExpr::column("a", "object_id")),
                SqlExpr::column("link", "subject_type").eq(SqlExpr::string(&plan.object_type)),
            ]),
        )],
        where_clause: Some(
            SqlExpr::column("a", "depth").lt(SqlExpr::int(MAX_RESOLUTION_DEPTH)),
        ),
        ..SelectStmt::new()
    });
    let ancestors = CteDefinition::new(
        ANCESTORS_CTE,
        vec!["object_id".to_string(), "depth".to_string()],
        SqlQuery::Union(UnionAll::try_new(vec![base_term, recursive_term])?),
    );

    let ancestor_cond = |col: SqlExpr| {
        SqlExpr::exists(SelectStmt {
            from: Some(TableExpr::named_as(ANCESTORS_CTE, "anc")),
            where_clause: Some(SqlExpr::column("anc", "object_id").eq(col)),
            ..SelectStmt::new()
        })
    };
    let mut set = builder.subjects_block_set(&ancestor_cond);
    for (linking, target_relation, targets) in leftover_ttu_edges(plan) {
        for target_type in targets {
            set.push(builder.ttu_lateral_subjects_block(&linking, &target_relation, &target_type));
        }
    }

    paginated_return(plan, vec![ancestors], true, set)
}
