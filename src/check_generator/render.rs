//! Assembly of check blocks into complete PL/pgSQL functions.
//!
//! One renderer per function type; all share the argument list, the
//! userset-subject prelude and the exclusion conclusion. The emitted
//! bodies follow a fixed skeleton so diffs between schema versions stay
//! readable.

use crate::sql_ir::{
    FunctionArg, LocalDeclaration, PlpgsqlFunction, PlpgsqlStmt, SqlExpr, Volatility,
    DEPTH_ERRCODE, DEPTH_EXCEEDED_MESSAGE, MAX_RESOLUTION_DEPTH,
};

use super::blocks::CheckBlocks;
use super::plan::{CheckFunctionType, CheckPlan};

pub(crate) const VISITED_KEY_VAR: &str = "v_key";
const HAS_ACCESS_VAR: &str = "v_has_access";

/// The visited expression recursive calls thread onwards.
pub(crate) fn recursive_visited_expr() -> SqlExpr {
    SqlExpr::ArrayAppend {
        array: Box::new(SqlExpr::param("p_visited")),
        element: Box::new(SqlExpr::param(VISITED_KEY_VAR)),
    }
}

pub fn render_check_function(
    plan: &CheckPlan,
    blocks: &CheckBlocks,
    function_type: CheckFunctionType,
) -> PlpgsqlFunction {
    let mut function = PlpgsqlFunction::new(plan.function_name.clone(), "integer");
    function.volatility = Volatility::Stable;
    function.header_comments = vec![header_comment(plan)];
    function.args = check_function_args();

    match function_type {
        CheckFunctionType::Direct => {
            function.body = direct_body(blocks);
        }
        CheckFunctionType::Recursive => {
            function.declarations = vec![visited_key_declaration(plan)];
            let mut body = recursion_guards();
            body.extend(direct_body(blocks));
            function.body = body;
        }
        CheckFunctionType::Intersection => {
            function.declarations = vec![has_access_declaration()];
            function.body = intersection_body(blocks);
        }
        CheckFunctionType::RecursiveIntersection => {
            function.declarations =
                vec![visited_key_declaration(plan), has_access_declaration()];
            let mut body = recursion_guards();
            body.extend(intersection_body(blocks));
            function.body = body;
        }
    }
    function
}

fn header_comment(plan: &CheckPlan) -> String {
    if plan.no_wildcard {
        format!(
            "Access check for {}.{} (wildcard grants ignored)",
            plan.object_type, plan.relation
        )
    } else {
        format!("Access check for {}.{}", plan.object_type, plan.relation)
    }
}

fn check_function_args() -> Vec<FunctionArg> {
    vec![
        FunctionArg::new("p_subject_type", "text"),
        FunctionArg::new("p_subject_id", "text"),
        FunctionArg::new("p_object_id", "text"),
        FunctionArg::with_default("p_visited", "text[]", SqlExpr::empty_text_array()),
    ]
}

fn visited_key_declaration(plan: &CheckPlan) -> LocalDeclaration {
    LocalDeclaration::with_initial(
        VISITED_KEY_VAR,
        "text",
        SqlExpr::Concat(vec![
            SqlExpr::string(format!("{}:", plan.object_type)),
            SqlExpr::param("p_object_id"),
            SqlExpr::string(format!(":{}", plan.relation)),
        ]),
    )
}

fn has_access_declaration() -> LocalDeclaration {
    LocalDeclaration::with_initial(HAS_ACCESS_VAR, "boolean", SqlExpr::BoolLit(false))
}

fn recursion_guards() -> Vec<PlpgsqlStmt> {
    vec![
        PlpgsqlStmt::if_then(
            SqlExpr::param(VISITED_KEY_VAR).any_of(SqlExpr::param("p_visited")),
            vec![PlpgsqlStmt::Return(SqlExpr::int(0))],
        ),
        PlpgsqlStmt::if_then(
            SqlExpr::ArrayLength(Box::new(SqlExpr::param("p_visited")))
                .gt_eq(SqlExpr::int(MAX_RESOLUTION_DEPTH)),
            vec![PlpgsqlStmt::Raise {
                message: DEPTH_EXCEEDED_MESSAGE.to_string(),
                errcode: DEPTH_ERRCODE.to_string(),
            }],
        ),
    ]
}

/// `IF position('#' in p_subject_id) > 0` → validate the userset subject
/// against the closure and pattern tables.
fn userset_subject_prelude(blocks: &CheckBlocks) -> Vec<PlpgsqlStmt> {
    let mut validations = vec![SqlExpr::exists(blocks.userset_subject_self_check.clone())];
    if let Some(computed) = &blocks.userset_subject_computed_check {
        validations.push(SqlExpr::exists(computed.clone()));
    }
    vec![PlpgsqlStmt::if_then(
        SqlExpr::param("p_subject_id").has_userset(),
        vec![PlpgsqlStmt::if_then(
            SqlExpr::or(validations),
            vec![PlpgsqlStmt::Return(SqlExpr::int(1))],
        )],
    )]
}

/// `IF access THEN [exclusion dance] END IF; RETURN 0;`
fn grant_conclusion(access: SqlExpr, exclusion: Option<&SqlExpr>) -> Vec<PlpgsqlStmt> {
    let granted = match exclusion {
        Some(exclusion) => PlpgsqlStmt::if_then(
            access,
            vec![PlpgsqlStmt::if_then_else(
                exclusion.clone(),
                vec![PlpgsqlStmt::Return(SqlExpr::int(0))],
                vec![PlpgsqlStmt::Return(SqlExpr::int(1))],
            )],
        ),
        None => PlpgsqlStmt::if_then(access, vec![PlpgsqlStmt::Return(SqlExpr::int(1))]),
    };
    vec![granted, PlpgsqlStmt::Return(SqlExpr::int(0))]
}

fn direct_body(blocks: &CheckBlocks) -> Vec<PlpgsqlStmt> {
    let mut body = userset_subject_prelude(blocks);
    let access = blocks
        .standalone_access_expr()
        .unwrap_or(SqlExpr::BoolLit(false));
    body.extend(grant_conclusion(access, blocks.exclusion_check.as_ref()));
    body
}

fn intersection_body(blocks: &CheckBlocks) -> Vec<PlpgsqlStmt> {
    let mut body = userset_subject_prelude(blocks);

    if let Some(standalone) = blocks.standalone_access_expr() {
        body.push(PlpgsqlStmt::if_then(
            standalone,
            vec![PlpgsqlStmt::Assign {
                name: HAS_ACCESS_VAR.to_string(),
                value: SqlExpr::BoolLit(true),
            }],
        ));
    }

    for group_check in &blocks.intersection_group_checks {
        body.push(PlpgsqlStmt::if_then(
            SqlExpr::param(HAS_ACCESS_VAR).negate(),
            vec![PlpgsqlStmt::if_then(
                group_check.clone(),
                vec![PlpgsqlStmt::Assign {
                    name: HAS_ACCESS_VAR.to_string(),
                    value: SqlExpr::BoolLit(true),
                }],
            )],
        ));
    }

    body.extend(grant_conclusion(
        SqlExpr::param(HAS_ACCESS_VAR),
        blocks.exclusion_check.as_ref(),
    ));
    body
}
