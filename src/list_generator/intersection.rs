//! Intersection strategy.
//!
//! Objects: one INTERSECT chain per group, standalone blocks unioned in.
//! Subjects: gather candidate subjects from every part plus the pool of
//! the requested type, then filter each candidate through the check
//! dispatcher (which already embodies the intersection semantics,
//! wildcard included).

use crate::inline_data::InlineData;
use crate::schema_analyzer::{IntersectionGroup, IntersectionPart, IntersectionPartKind};
use crate::sql_ir::{
    CteDefinition, IntersectSubquery, PlpgsqlStmt, SelectStmt, SqlExpr, SqlQuery, TableExpr,
    TupleQuery, WithCte,
};

use super::assembly::paginated_return;
use super::block_set::BlockSet;
use super::errors::ListGeneratorError;
use super::exclusion::{exclusion_predicate, ExclusionContext};
use super::pagination::paginate;
use super::plan::{ListDirection, ListPlan};
use super::shared_blocks::ListBlockBuilder;
use super::ListFunctionParts;

const CANDIDATES_CTE: &str = "subject_candidates";
const FILTERED_CTE: &str = "filtered_candidates";

pub(crate) fn build(
    plan: &ListPlan,
    inline: &InlineData,
) -> Result<ListFunctionParts, ListGeneratorError> {
    let stmt = match plan.direction {
        ListDirection::Objects => objects(plan, inline)?,
        ListDirection::Subjects => subjects(plan)?,
    };
    Ok(ListFunctionParts {
        declarations: Vec::new(),
        body: vec![stmt],
    })
}

fn objects(plan: &ListPlan, inline: &InlineData) -> Result<PlpgsqlStmt, ListGeneratorError> {
    let builder = ListBlockBuilder::new(plan, inline);
    let mut set = BlockSet::new(ListDirection::Objects);

    for group in &plan.intersection_groups {
        set.push(group_objects_query(plan, group)?);
    }
    if plan.has_standalone_access() {
        for block in builder.objects_block_set().primary {
            set.push(block);
        }
    }
    paginated_return(plan, Vec::new(), false, set)
}

/// INTERSECT of the group's part subqueries, wrapped with the relation's
/// exclusions when present.
fn group_objects_query(
    plan: &ListPlan,
    group: &IntersectionGroup,
) -> Result<SqlQuery, ListGeneratorError> {
    let parts: Vec<SqlQuery> = group
        .parts
        .iter()
        .map(|part| part_objects_query(plan, part))
        .collect();
    let intersect = SqlQuery::Intersect(IntersectSubquery::try_new(parts)?);

    let object_col = SqlExpr::column("gq", "object_id");
    let keep = exclusion_predicate(
        plan,
        &plan.exclusions,
        &ExclusionContext::for_object(object_col.clone()),
    )
    .map(SqlExpr::negate);
    match keep {
        Some(keep) => Ok(SqlQuery::Select(SelectStmt {
            columns: vec![object_col],
            from: Some(TableExpr::subquery(intersect, "gq")),
            where_clause: Some(keep),
            ..SelectStmt::new()
        })),
        None => Ok(intersect),
    }
}

fn part_objects_query(plan: &ListPlan, part: &IntersectionPart) -> SqlQuery {
    let base = match &part.kind {
        IntersectionPartKind::Direct {
            relations,
            has_wildcard,
            ..
        } => {
            let query = TupleQuery::new("t");
            let col = query.col("object_id");
            SqlQuery::Select(
                query
                    .distinct()
                    .select(col)
                    .object_type(&plan.object_type)
                    .relations(relations)
                    .subject_type(SqlExpr::param("p_subject_type"))
                    .subject_id_matches(SqlExpr::param("p_subject_id"), *has_wildcard)
                    .build(),
            )
        }
        IntersectionPartKind::ComputedUserset {
            relation,
            satisfying_relations,
            has_wildcard,
            is_complex,
        } => {
            if *is_complex {
                let query = TupleQuery::new("t");
                let col = query.col("object_id");
                let call = SqlExpr::call(
                    plan.fresh_check_dispatcher(),
                    vec![
                        SqlExpr::param("p_subject_type"),
                        SqlExpr::param("p_subject_id"),
                        SqlExpr::string(relation),
                        SqlExpr::string(&plan.object_type),
                        col.clone(),
                    ],
                )
                .eq(SqlExpr::int(1));
                SqlQuery::Select(
                    query
                        .distinct()
                        .select(col)
                        .object_type(&plan.object_type)
                        .relations(&plan.all_satisfying_relations)
                        .filter(call)
                        .build(),
                )
            } else {
                let query = TupleQuery::new("t");
                let col = query.col("object_id");
                SqlQuery::Select(
                    query
                        .distinct()
                        .select(col)
                        .object_type(&plan.object_type)
                        .relations(satisfying_relations)
                        .subject_type(SqlExpr::param("p_subject_type"))
                        .subject_id_matches(SqlExpr::param("p_subject_id"), *has_wildcard)
                        .build(),
                )
            }
        }
        IntersectionPartKind::TupleToUserset(parent) => {
            let link = TupleQuery::new("link");
            let col = link.col("object_id");
            let call = SqlExpr::call(
                plan.fresh_check_dispatcher(),
                vec![
                    SqlExpr::param("p_subject_type"),
                    SqlExpr::param("p_subject_id"),
                    SqlExpr::string(&parent.target_relation),
                    link.col("subject_type"),
                    link.col("subject_id"),
                ],
            )
            .eq(SqlExpr::int(1));
            let guard = link
                .col("subject_type")
                .in_strings(parent.target_types.iter().map(|t| t.to_string()));
            SqlQuery::Select(
                link.distinct()
                    .select(col)
                    .object_type(&plan.object_type)
                    .relations(std::slice::from_ref(&parent.linking_relation))
                    .filter(guard)
                    .filter(call)
                    .build(),
            )
        }
    };

    match &part.but_not {
        Some(config) => {
            let col = SqlExpr::column("pq", "object_id");
            let excluded = exclusion_predicate(plan, config, &ExclusionContext::for_object(col.clone()))
                .unwrap_or(SqlExpr::BoolLit(false));
            SqlQuery::Select(SelectStmt {
                columns: vec![col],
                from: Some(TableExpr::subquery(base, "pq")),
                where_clause: Some(excluded.negate()),
                ..SelectStmt::new()
            })
        }
        None => base,
    }
}

fn subjects(plan: &ListPlan) -> Result<PlpgsqlStmt, ListGeneratorError> {
    let mut contributors: Vec<SqlQuery> = Vec::new();
    for group in &plan.intersection_groups {
        for part in &group.parts {
            contributors.push(part_subject_candidates(plan, part));
        }
    }
    contributors.push(subject_pool());

    let candidates = CteDefinition::new(
        CANDIDATES_CTE,
        Vec::new(),
        SqlQuery::Union(crate::sql_ir::UnionAll::try_new(contributors)?),
    );

    // Every candidate runs through the dispatcher; the check embodies the
    // full intersection semantics including wildcard handling.
    let filter_call = SqlExpr::call(
        plan.fresh_check_dispatcher(),
        vec![
            SqlExpr::param("p_subject_type"),
            SqlExpr::column("c", "subject_id"),
            SqlExpr::string(&plan.relation),
            SqlExpr::string(&plan.object_type),
            SqlExpr::param("p_object_id"),
        ],
    )
    .eq(SqlExpr::int(1));
    let filtered = CteDefinition::new(
        FILTERED_CTE,
        Vec::new(),
        SqlQuery::Select(SelectStmt {
            distinct: true,
            columns: vec![SqlExpr::column("c", "subject_id")],
            from: Some(TableExpr::named_as(CANDIDATES_CTE, "c")),
            where_clause: Some(filter_call),
            ..SelectStmt::new()
        }),
    );

    let body = SqlQuery::Select(SelectStmt {
        columns: vec![SqlExpr::column(FILTERED_CTE, "subject_id")],
        from: Some(TableExpr::named(FILTERED_CTE)),
        ..SelectStmt::new()
    });
    let query = SqlQuery::With(WithCte::try_new(false, vec![candidates, filtered], body)?);
    Ok(PlpgsqlStmt::ReturnQuery(paginate(
        query,
        ListDirection::Subjects.id_column(),
        false,
    )))
}

fn part_subject_candidates(plan: &ListPlan, part: &IntersectionPart) -> SqlQuery {
    let relations: Vec<String> = match &part.kind {
        IntersectionPartKind::Direct { relations, .. } => relations.clone(),
        IntersectionPartKind::ComputedUserset {
            satisfying_relations,
            is_complex,
            ..
        } => {
            if *is_complex {
                plan.all_satisfying_relations.clone()
            } else {
                satisfying_relations.clone()
            }
        }
        IntersectionPartKind::TupleToUserset(parent) => {
            // Contributors come from the linked parents' subject listings.
            return ttu_part_candidates(plan, parent);
        }
    };
    let query = TupleQuery::new("t");
    let subject_col = query.col("subject_id");
    SqlQuery::Select(
        query
            .distinct()
            .select(subject_col.clone())
            .object_type(&plan.object_type)
            .relations(&relations)
            .object_id(SqlExpr::param("p_object_id"))
            .subject_type(SqlExpr::param("p_subject_type"))
            .filter(subject_col.has_userset().negate())
            .build(),
    )
}

fn ttu_part_candidates(plan: &ListPlan, parent: &crate::schema_analyzer::ParentRelation) -> SqlQuery {
    let mut branches = Vec::new();
    for target_type in &parent.target_types {
        let link = TupleQuery::new("link");
        let lateral_call = SqlExpr::call(
            crate::utils::list_subjects_function_name(target_type, &parent.target_relation),
            vec![
                SqlExpr::column("link", "subject_id"),
                SqlExpr::param("p_subject_type"),
                SqlExpr::Null,
                SqlExpr::Null,
            ],
        );
        branches.push(SqlQuery::Select(
            link.distinct()
                .select(SqlExpr::column("l", "subject_id"))
                .object_type(&plan.object_type)
                .relations(std::slice::from_ref(&parent.linking_relation))
                .object_id(SqlExpr::param("p_object_id"))
                .filter(
                    SqlExpr::column("link", "subject_type").eq(SqlExpr::string(target_type)),
                )
                .join(crate::sql_ir::JoinClause::cross_lateral(
                    TableExpr::function(lateral_call, "l"),
                ))
                .build(),
        ));
    }
    if branches.len() == 1 {
        branches.remove(0)
    } else {
        SqlQuery::Union(crate::sql_ir::UnionAll(branches))
    }
}

/// All stored subjects of the requested type: the final candidate pool.
fn subject_pool() -> SqlQuery {
    let query = TupleQuery::new("t");
    let subject_col = query.col("subject_id");
    SqlQuery::Select(
        query
            .distinct()
            .select(subject_col.clone())
            .subject_type(SqlExpr::param("p_subject_type"))
            .filter(subject_col.has_userset().negate())
            .build(),
    )
}
