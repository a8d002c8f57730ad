//! Cursor pagination around a finished list query.
//!
//! The wrapped query fetches `p_limit + 1` rows past the cursor; when the
//! overflow row arrives, `next_cursor` carries the id of the last row
//! actually returned (consistent with the `id > p_after` filter), else it
//! is NULL. A NULL `p_limit` returns everything.

use crate::sql_ir::{
    CompareOp, CteDefinition, OrderByExpr, SelectStmt, SqlExpr, SqlQuery, TableExpr, WithCte,
};

const RESULTS_CTE: &str = "results";
const PAGE_CTE: &str = "page";
const NUMBERED_CTE: &str = "numbered";

/// Wrap `query` (one column named `id_column`) into the paginated shape.
/// `wildcard_first` orders the `*` subject ahead of everything else.
pub fn paginate(query: SqlQuery, id_column: &str, wildcard_first: bool) -> SqlQuery {
    let results = CteDefinition::new(
        RESULTS_CTE,
        Vec::new(),
        SqlQuery::Select(SelectStmt {
            distinct: true,
            columns: vec![SqlExpr::column("q", id_column).aliased("id")],
            from: Some(TableExpr::subquery(query, "q")),
            ..SelectStmt::new()
        }),
    );

    let results_id = SqlExpr::column(RESULTS_CTE, "id");
    let mut page_order = Vec::new();
    if wildcard_first {
        page_order.push(OrderByExpr::desc(results_id.clone().is_wildcard()));
    }
    page_order.push(OrderByExpr::asc(results_id.clone()));

    let page = CteDefinition::new(
        PAGE_CTE,
        Vec::new(),
        SqlQuery::Select(SelectStmt {
            columns: vec![results_id.clone()],
            from: Some(TableExpr::named(RESULTS_CTE)),
            where_clause: Some(SqlExpr::or(vec![
                SqlExpr::param("p_after").is_null(),
                results_id.gt(SqlExpr::param("p_after")),
            ])),
            order_by: page_order,
            limit: Some(SqlExpr::CaseWhen {
                branches: vec![(SqlExpr::param("p_limit").is_null(), SqlExpr::Null)],
                else_expr: Some(Box::new(
                    SqlExpr::param("p_limit").plus(SqlExpr::int(1)),
                )),
            }),
            ..SelectStmt::new()
        }),
    );

    // Row numbering preserves the page ordering.
    let row_number_order = if wildcard_first {
        "(page.id = '*') DESC, page.id".to_string()
    } else {
        "page.id".to_string()
    };
    let numbered = CteDefinition::new(
        NUMBERED_CTE,
        Vec::new(),
        SqlQuery::Select(SelectStmt {
            columns: vec![
                SqlExpr::column(PAGE_CTE, "id"),
                SqlExpr::raw(format!(
                    "row_number() OVER (ORDER BY {}) AS rn",
                    row_number_order
                )),
            ],
            from: Some(TableExpr::named(PAGE_CTE)),
            ..SelectStmt::new()
        }),
    );

    let overflow_seen = SqlExpr::and(vec![
        SqlExpr::param("p_limit").is_not_null(),
        SqlExpr::subquery(SelectStmt {
            columns: vec![SqlExpr::call("max", vec![SqlExpr::column("n2", "rn")])],
            from: Some(TableExpr::named_as(NUMBERED_CTE, "n2")),
            ..SelectStmt::new()
        })
        .gt(SqlExpr::param("p_limit")),
    ]);
    let last_returned_id = SqlExpr::subquery(SelectStmt {
        columns: vec![SqlExpr::column("n3", "id")],
        from: Some(TableExpr::named_as(NUMBERED_CTE, "n3")),
        where_clause: Some(SqlExpr::column("n3", "rn").eq(SqlExpr::param("p_limit"))),
        ..SelectStmt::new()
    });

    let body = SelectStmt {
        columns: vec![
            SqlExpr::column(NUMBERED_CTE, "id"),
            SqlExpr::CaseWhen {
                branches: vec![(overflow_seen, last_returned_id)],
                else_expr: Some(Box::new(SqlExpr::Null)),
            }
            .aliased("next_cursor"),
        ],
        from: Some(TableExpr::named(NUMBERED_CTE)),
        where_clause: Some(SqlExpr::or(vec![
            SqlExpr::param("p_limit").is_null(),
            SqlExpr::column(NUMBERED_CTE, "rn").compare(CompareOp::LtEq, SqlExpr::param("p_limit")),
        ])),
        order_by: vec![OrderByExpr::asc(SqlExpr::column(NUMBERED_CTE, "rn"))],
        ..SelectStmt::new()
    };

    SqlQuery::With(
        WithCte::try_new(false, vec![results, page, numbered], SqlQuery::Select(body))
            .expect("pagination always defines its CTEs"),
    )
}
