//! SelfRefUserset strategy: a relation whose userset pattern points back
//! at itself (`group#member` inside `group.member`).
//!
//! Objects expand outwards from the subject's direct memberships through
//! nested userset grants. Subjects branch on the caller's subject type:
//! a compound `type#relation` filter lists the userset objects
//! themselves, the plain path expands the queried object's nested
//! usersets before collecting members.

use crate::inline_data::InlineData;
use crate::schema_analyzer::UsersetPattern;
use crate::sql_ir::{
    CteDefinition, JoinClause, LocalDeclaration, PlpgsqlStmt, SelectStmt, SqlExpr, SqlQuery,
    TableExpr, TupleQuery, UnionAll, MAX_RESOLUTION_DEPTH, TUPLES_TABLE,
};

use super::assembly::paginated_return;
use super::block_set::BlockSet;
use super::errors::ListGeneratorError;
use super::pagination::paginate;
use super::plan::{ListDirection, ListPlan};
use super::shared_blocks::ListBlockBuilder;
use super::ListFunctionParts;

const EXPANSION_CTE: &str = "userset_expansion";
const FILTER_TYPE_VAR: &str = "v_filter_type";
const FILTER_RELATION_VAR: &str = "v_filter_relation";

pub(crate) fn build(
    plan: &ListPlan,
    inline: &InlineData,
) -> Result<ListFunctionParts, ListGeneratorError> {
    let Some(self_pattern) = plan
        .userset_patterns
        .iter()
        .find(|p| p.subject_type == plan.object_type && p.subject_relation == plan.relation)
        .cloned()
    else {
        return Err(ListGeneratorError::NoBlocks {
            object_type: plan.object_type.clone(),
            relation: plan.relation.clone(),
        });
    };

    match plan.direction {
        ListDirection::Objects => objects(plan, inline, &self_pattern),
        ListDirection::Subjects => subjects(plan, inline, &self_pattern),
    }
}

/// Recursive step shared by both directions: userset grants whose
/// relation satisfies the pattern, hopping from an expanded object.
fn expansion_step(
    plan: &ListPlan,
    pattern: &UsersetPattern,
    from_expanded_to_grant: bool,
) -> SqlQuery {
    let granted_subject = SqlExpr::column("t", "subject_id");
    let (projected, hop_match) = if from_expanded_to_grant {
        // Objects direction: the expanded object is the grant's subject.
        (
            SqlExpr::column("t", "object_id").aliased("userset_object_id"),
            granted_subject
                .clone()
                .split_object_id()
                .eq(SqlExpr::column("ue", "userset_object_id")),
        )
    } else {
        // Subjects direction: descend into the granted userset.
        (
            granted_subject
                .clone()
                .split_object_id()
                .aliased("userset_object_id"),
            SqlExpr::column("t", "object_id").eq(SqlExpr::column("ue", "userset_object_id")),
        )
    };
    SqlQuery::Select(SelectStmt {
        columns: vec![
            projected,
            SqlExpr::column("ue", "depth")
                .plus(SqlExpr::int(1))
                .aliased("depth"),
        ],
        from: Some(TableExpr::named_as(EXPANSION_CTE, "ue")),
        joins: vec![JoinClause::inner(
            TableExpr::named_as(TUPLES_TABLE, "t"),
            SqlExpr::and(vec![
                SqlExpr::column("t", "object_type").eq(SqlExpr::string(&plan.object_type)),
                SqlExpr::column("t", "relation")
                    .in_strings(plan.direct_relations.iter().map(|r| r.to_string())),
                SqlExpr::column("t", "subject_type").eq(SqlExpr::string(&pattern.subject_type)),
                granted_subject.clone().has_userset(),
                granted_subject.clone().split_relation().in_strings(
                    pattern.satisfying_relations.iter().map(|r| r.to_string()),
                ),
                hop_match,
            ]),
        )],
        where_clause: Some(SqlExpr::column("ue", "depth").lt(SqlExpr::int(MAX_RESOLUTION_DEPTH))),
        ..SelectStmt::new()
    })
}

fn objects(
    plan: &ListPlan,
    inline: &InlineData,
    pattern: &UsersetPattern,
) -> Result<ListFunctionParts, ListGeneratorError> {
    // Base: objects whose grant names the subject directly.
    let base_query = TupleQuery::new("t");
    let base = SqlQuery::Select(
        base_query
            .distinct()
            .select(SqlExpr::column("t", "object_id").aliased("userset_object_id"))
            .select(SqlExpr::int(0).aliased("depth"))
            .object_type(&plan.object_type)
            .relations(&plan.direct_relations)
            .subject_type(SqlExpr::param("p_subject_type"))
            .subject_id_matches(SqlExpr::param("p_subject_id"), plan.has_wildcard)
            .filter(SqlExpr::column("t", "subject_id").has_userset().negate())
            .build(),
    );

    let expansion = CteDefinition::new(
        EXPANSION_CTE,
        vec!["userset_object_id".to_string(), "depth".to_string()],
        SqlQuery::Union(UnionAll::try_new(vec![
            base,
            expansion_step(plan, pattern, true),
        ])?),
    );

    let expansion_select = SqlQuery::Select(SelectStmt {
        distinct: true,
        columns: vec![
            SqlExpr::column(EXPANSION_CTE, "userset_object_id").aliased("object_id"),
        ],
        from: Some(TableExpr::named(EXPANSION_CTE)),
        ..SelectStmt::new()
    });

    let builder = ListBlockBuilder::new(plan, inline);
    let mut set = BlockSet::new(ListDirection::Objects);
    set.push(expansion_select);
    for block in builder.objects_block_set().primary {
        set.push(block);
    }

    let stmt = paginated_return(plan, vec![expansion], true, set)?;
    Ok(ListFunctionParts {
        declarations: Vec::new(),
        body: vec![stmt],
    })
}

fn subjects(
    plan: &ListPlan,
    inline: &InlineData,
    pattern: &UsersetPattern,
) -> Result<ListFunctionParts, ListGeneratorError> {
    // Compound-filter path: the caller asks for userset subjects of one
    // specific `type#relation`.
    let filter_query = TupleQuery::new("t");
    let granted_subject = filter_query.col("subject_id");
    let filter_select = SqlQuery::Select(
        filter_query
            .distinct()
            .select(granted_subject.clone().split_object_id().aliased("subject_id"))
            .object_type(&plan.object_type)
            .relations(&plan.direct_relations)
            .object_id(SqlExpr::param("p_object_id"))
            .subject_type(SqlExpr::param(FILTER_TYPE_VAR))
            .filter(granted_subject.clone().has_userset())
            .filter(
                granted_subject
                    .split_relation()
                    .eq(SqlExpr::param(FILTER_RELATION_VAR)),
            )
            .build(),
    );
    let filter_return = PlpgsqlStmt::ReturnQuery(paginate(
        filter_select,
        ListDirection::Subjects.id_column(),
        false,
    ));

    // Regular path: expand the queried object through nested usersets,
    // then collect plain members of every expanded object.
    let seed = SqlQuery::Select(SelectStmt {
        columns: vec![
            SqlExpr::param("p_object_id").aliased("userset_object_id"),
            SqlExpr::int(0).aliased("depth"),
        ],
        ..SelectStmt::new()
    });
    let expansion = CteDefinition::new(
        EXPANSION_CTE,
        vec!["userset_object_id".to_string(), "depth".to_string()],
        SqlQuery::Union(UnionAll::try_new(vec![
            seed,
            expansion_step(plan, pattern, false),
        ])?),
    );

    let expansion_cond = |col: SqlExpr| {
        SqlExpr::exists(SelectStmt {
            from: Some(TableExpr::named_as(EXPANSION_CTE, "ue")),
            where_clause: Some(SqlExpr::column("ue", "userset_object_id").eq(col)),
            ..SelectStmt::new()
        })
    };
    let builder = ListBlockBuilder::new(plan, inline);
    let set = builder.subjects_block_set(&expansion_cond);
    let regular_return = paginated_return(plan, vec![expansion], true, set)?;

    let body = vec![
        PlpgsqlStmt::if_then(
            SqlExpr::param("p_subject_type").has_userset(),
            vec![
                PlpgsqlStmt::Assign {
                    name: FILTER_TYPE_VAR.to_string(),
                    value: SqlExpr::param("p_subject_type").split_object_id(),
                },
                PlpgsqlStmt::Assign {
                    name: FILTER_RELATION_VAR.to_string(),
                    value: SqlExpr::param("p_subject_type").split_relation(),
                },
                filter_return,
                PlpgsqlStmt::ReturnNothing,
            ],
        ),
        regular_return,
    ];

    Ok(ListFunctionParts {
        declarations: vec![
            LocalDeclaration::new(FILTER_TYPE_VAR, "text"),
            LocalDeclaration::new(FILTER_RELATION_VAR, "text"),
        ],
        body,
    })
}
