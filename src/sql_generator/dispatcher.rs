//! Dispatcher functions: route `(object_type, relation)` to the
//! specialised functions. Unknown pairs deny (0 / empty result) rather
//! than raise.

use crate::schema_analyzer::RelationAnalysis;
use crate::sql_ir::{
    FunctionArg, PlpgsqlFunction, PlpgsqlStmt, SqlExpr, Volatility, DEPTH_ERRCODE,
    DEPTH_EXCEEDED_MESSAGE, MAX_RESOLUTION_DEPTH,
};
use crate::utils::{
    check_function_name, list_objects_function_name, list_subjects_function_name,
    CHECK_DISPATCHER, CHECK_DISPATCHER_INTERNAL, CHECK_DISPATCHER_NO_WILDCARD,
    CHECK_DISPATCHER_NO_WILDCARD_INTERNAL, LIST_OBJECTS_DISPATCHER, LIST_SUBJECTS_DISPATCHER,
};

fn pair_condition(analysis: &RelationAnalysis) -> SqlExpr {
    SqlExpr::and(vec![
        SqlExpr::param("p_object_type").eq(SqlExpr::string(&analysis.object_type)),
        SqlExpr::param("p_relation").eq(SqlExpr::string(&analysis.relation)),
    ])
}

/// `check_permission_internal` (or its no-wildcard twin): depth guard,
/// then one `CASE` arm per relation.
pub fn check_dispatcher_internal(
    sorted: &[&RelationAnalysis],
    no_wildcard: bool,
) -> PlpgsqlFunction {
    let name = if no_wildcard {
        CHECK_DISPATCHER_NO_WILDCARD_INTERNAL
    } else {
        CHECK_DISPATCHER_INTERNAL
    };
    let mut function = PlpgsqlFunction::new(name, "integer");
    function.volatility = Volatility::Stable;
    function.header_comments = vec![
        "Routes a permission check to the relation's specialised function.".to_string(),
        "Unknown (object_type, relation) pairs deny by returning 0.".to_string(),
    ];
    function.args = vec![
        FunctionArg::new("p_subject_type", "text"),
        FunctionArg::new("p_subject_id", "text"),
        FunctionArg::new("p_relation", "text"),
        FunctionArg::new("p_object_type", "text"),
        FunctionArg::new("p_object_id", "text"),
        FunctionArg::with_default("p_visited", "text[]", SqlExpr::empty_text_array()),
    ];

    let branches: Vec<(SqlExpr, SqlExpr)> = sorted
        .iter()
        .map(|analysis| {
            let call = SqlExpr::call(
                check_function_name(&analysis.object_type, &analysis.relation, no_wildcard),
                vec![
                    SqlExpr::param("p_subject_type"),
                    SqlExpr::param("p_subject_id"),
                    SqlExpr::param("p_object_id"),
                    SqlExpr::param("p_visited"),
                ],
            );
            (pair_condition(analysis), call)
        })
        .collect();

    function.body = vec![
        PlpgsqlStmt::if_then(
            SqlExpr::ArrayLength(Box::new(SqlExpr::param("p_visited")))
                .gt_eq(SqlExpr::int(MAX_RESOLUTION_DEPTH)),
            vec![PlpgsqlStmt::Raise {
                message: DEPTH_EXCEEDED_MESSAGE.to_string(),
                errcode: DEPTH_ERRCODE.to_string(),
            }],
        ),
        PlpgsqlStmt::Return(SqlExpr::CaseWhen {
            branches,
            else_expr: Some(Box::new(SqlExpr::int(0))),
        }),
    ];
    function
}

/// `check_permission` shim: starts the chain with an empty visited
/// array.
pub fn check_dispatcher_shim(no_wildcard: bool) -> PlpgsqlFunction {
    let (name, internal) = if no_wildcard {
        (CHECK_DISPATCHER_NO_WILDCARD, CHECK_DISPATCHER_NO_WILDCARD_INTERNAL)
    } else {
        (CHECK_DISPATCHER, CHECK_DISPATCHER_INTERNAL)
    };
    let mut function = PlpgsqlFunction::new(name, "integer");
    function.volatility = Volatility::Stable;
    function.header_comments =
        vec!["Public permission check; starts a fresh resolution chain.".to_string()];
    function.args = vec![
        FunctionArg::new("p_subject_type", "text"),
        FunctionArg::new("p_subject_id", "text"),
        FunctionArg::new("p_relation", "text"),
        FunctionArg::new("p_object_type", "text"),
        FunctionArg::new("p_object_id", "text"),
    ];
    function.body = vec![PlpgsqlStmt::Return(SqlExpr::call(
        internal,
        vec![
            SqlExpr::param("p_subject_type"),
            SqlExpr::param("p_subject_id"),
            SqlExpr::param("p_relation"),
            SqlExpr::param("p_object_type"),
            SqlExpr::param("p_object_id"),
            SqlExpr::empty_text_array(),
        ],
    ))];
    function
}

/// `list_accessible_objects`: IF/ELSIF routing with `RETURN QUERY` into
/// the specialised listings; unknown pairs return an empty set.
pub fn list_objects_dispatcher(sorted: &[&RelationAnalysis]) -> PlpgsqlFunction {
    let mut function = PlpgsqlFunction::new(
        LIST_OBJECTS_DISPATCHER,
        "TABLE(object_id text, next_cursor text)",
    );
    function.volatility = Volatility::Stable;
    function.rows_estimate = Some(100);
    function.header_comments =
        vec!["Routes an object listing to the relation's specialised function.".to_string()];
    function.args = vec![
        FunctionArg::new("p_subject_type", "text"),
        FunctionArg::new("p_subject_id", "text"),
        FunctionArg::new("p_relation", "text"),
        FunctionArg::new("p_object_type", "text"),
        FunctionArg::with_default("p_limit", "integer", SqlExpr::Null),
        FunctionArg::with_default("p_after", "text", SqlExpr::Null),
    ];

    let mut body = Vec::new();
    for analysis in sorted {
        if !analysis.capabilities.list_allowed {
            continue;
        }
        let call = format!(
            "RETURN QUERY\nSELECT l.object_id, l.next_cursor\nFROM {}(p_subject_type, p_subject_id, p_limit, p_after) AS l;",
            list_objects_function_name(&analysis.object_type, &analysis.relation)
        );
        body.push(PlpgsqlStmt::if_then(
            pair_condition(analysis),
            vec![PlpgsqlStmt::Raw(call), PlpgsqlStmt::ReturnNothing],
        ));
    }
    body.push(PlpgsqlStmt::ReturnNothing);
    function.body = body;
    function
}

/// `list_accessible_subjects`: the symmetric subject-side dispatcher.
pub fn list_subjects_dispatcher(sorted: &[&RelationAnalysis]) -> PlpgsqlFunction {
    let mut function = PlpgsqlFunction::new(
        LIST_SUBJECTS_DISPATCHER,
        "TABLE(subject_id text, next_cursor text)",
    );
    function.volatility = Volatility::Stable;
    function.rows_estimate = Some(100);
    function.header_comments =
        vec!["Routes a subject listing to the relation's specialised function.".to_string()];
    function.args = vec![
        FunctionArg::new("p_object_id", "text"),
        FunctionArg::new("p_subject_type", "text"),
        FunctionArg::new("p_relation", "text"),
        FunctionArg::new("p_object_type", "text"),
        FunctionArg::with_default("p_limit", "integer", SqlExpr::Null),
        FunctionArg::with_default("p_after", "text", SqlExpr::Null),
    ];

    let mut body = Vec::new();
    for analysis in sorted {
        if !analysis.capabilities.list_allowed {
            continue;
        }
        let call = format!(
            "RETURN QUERY\nSELECT l.subject_id, l.next_cursor\nFROM {}(p_object_id, p_subject_type, p_limit, p_after) AS l;",
            list_subjects_function_name(&analysis.object_type, &analysis.relation)
        );
        body.push(PlpgsqlStmt::if_then(
            pair_condition(analysis),
            vec![PlpgsqlStmt::Raw(call), PlpgsqlStmt::ReturnNothing],
        ));
    }
    body.push(PlpgsqlStmt::ReturnNothing);
    function.body = body;
    function
}
