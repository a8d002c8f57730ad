//! Serialisation of the IR families to SQL text.
//!
//! This is a tree printer, not a SQL manipulator: no re-parsing, no
//! post-editing of produced text. Identical trees render byte-identically.

use super::expr::{CheckPermissionCall, SqlExpr};
use super::plpgsql::{FunctionArg, LocalDeclaration, PlpgsqlFunction, PlpgsqlStmt};
use super::stmt::{
    CteDefinition, IntersectSubquery, JoinClause, JoinType, OrderByExpr, OrderDirection,
    SelectStmt, SqlQuery, UnionAll, WithCte,
};
use super::table_expr::TableExpr;
use super::ToSql;

const INDENT: &str = "    ";

/// Quote a string literal for emission, doubling embedded single quotes.
///
/// The only path by which free-form text reaches the emitted SQL; every
/// literal-rendering site goes through this function (or through `Raw`,
/// which is reserved for compiler-owned text).
pub fn quote_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Prefix every non-empty line of `text` with one indent step.
pub(crate) fn indent_lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", INDENT, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl ToSql for SqlExpr {
    fn to_sql(&self) -> String {
        match self {
            SqlExpr::Param(name) => name.clone(),
            SqlExpr::Column { table, name } => match table {
                Some(t) => format!("{}.{}", t, name),
                None => name.clone(),
            },
            SqlExpr::StringLit(s) => quote_string_literal(s),
            SqlExpr::IntLit(i) => i.to_string(),
            SqlExpr::BoolLit(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            SqlExpr::Null => "NULL".to_string(),
            SqlExpr::Raw(sql) => sql.clone(),
            SqlExpr::FnCall { name, args } => {
                let args_sql: Vec<String> = args.iter().map(|a| a.to_sql()).collect();
                format!("{}({})", name, args_sql.join(", "))
            }
            SqlExpr::Alias { expr, alias } => format!("{} AS {}", expr.to_sql(), alias),
            SqlExpr::Paren(inner) => format!("({})", inner.to_sql()),
            SqlExpr::Concat(parts) => {
                let parts_sql: Vec<String> = parts.iter().map(|p| p.to_sql()).collect();
                format!("({})", parts_sql.join(" || "))
            }
            SqlExpr::Position { needle, haystack } => {
                format!("position({} in {})", needle.to_sql(), haystack.to_sql())
            }
            SqlExpr::Substring {
                source,
                start,
                length,
            } => match length {
                Some(len) => format!(
                    "substring({} from {} for {})",
                    source.to_sql(),
                    start.to_sql(),
                    len.to_sql()
                ),
                None => format!("substring({} from {})", source.to_sql(), start.to_sql()),
            },
            SqlExpr::Compare { op, left, right } => {
                format!("({} {} {})", left.to_sql(), op.symbol(), right.to_sql())
            }
            SqlExpr::Add { left, right } => {
                format!("({} + {})", left.to_sql(), right.to_sql())
            }
            SqlExpr::InList {
                expr,
                items,
                negated,
            } => {
                if items.is_empty() {
                    // Empty membership has a fixed truth value; render the
                    // unit so composition stays valid.
                    return if *negated { "TRUE" } else { "FALSE" }.to_string();
                }
                let items_sql: Vec<String> = items.iter().map(|i| i.to_sql()).collect();
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("({} {} ({}))", expr.to_sql(), op, items_sql.join(", "))
            }
            SqlExpr::And(children) => render_bool_chain(children, "AND", "TRUE"),
            SqlExpr::Or(children) => render_bool_chain(children, "OR", "FALSE"),
            SqlExpr::Not(inner) => format!("(NOT {})", inner.to_sql()),
            SqlExpr::Exists { query, negated } => {
                let keyword = if *negated { "NOT EXISTS" } else { "EXISTS" };
                format!("{} (\n{}\n)", keyword, indent_lines(&query.to_sql()))
            }
            SqlExpr::IsNull { expr, negated } => {
                let op = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("({} {})", expr.to_sql(), op)
            }
            SqlExpr::ArrayLit(items) => {
                if items.is_empty() {
                    "ARRAY[]::text[]".to_string()
                } else {
                    let items_sql: Vec<String> = items.iter().map(|i| i.to_sql()).collect();
                    format!("ARRAY[{}]", items_sql.join(", "))
                }
            }
            SqlExpr::ArrayAppend { array, element } => {
                format!("({} || {})", array.to_sql(), element.to_sql())
            }
            SqlExpr::ArrayConcat { left, right } => {
                format!("({} || {})", left.to_sql(), right.to_sql())
            }
            SqlExpr::ArrayLength(inner) => format!("array_length({}, 1)", inner.to_sql()),
            SqlExpr::AnyArray { expr, array } => {
                format!("({} = ANY({}))", expr.to_sql(), array.to_sql())
            }
            SqlExpr::CaseWhen {
                branches,
                else_expr,
            } => {
                let mut out = String::from("CASE");
                for (cond, result) in branches {
                    out.push_str(&format!(
                        "\n{}WHEN {} THEN {}",
                        INDENT,
                        cond.to_sql(),
                        result.to_sql()
                    ));
                }
                if let Some(else_expr) = else_expr {
                    out.push_str(&format!("\n{}ELSE {}", INDENT, else_expr.to_sql()));
                }
                out.push_str("\nEND");
                out
            }
            SqlExpr::Subquery(query) => {
                format!("(\n{}\n)", indent_lines(&query.to_sql()))
            }
            SqlExpr::SplitObjectId(inner) => format!("split_part({}, '#', 1)", inner.to_sql()),
            SqlExpr::SplitRelation(inner) => format!("split_part({}, '#', 2)", inner.to_sql()),
            SqlExpr::HasUserset(inner) => {
                format!("(position('#' in {}) > 0)", inner.to_sql())
            }
            SqlExpr::IsWildcard(inner) => format!("({} = '*')", inner.to_sql()),
            SqlExpr::SubstringUsersetRelation(inner) => {
                let src = inner.to_sql();
                format!("substring({} from position('#' in {}) + 1)", src, src)
            }
            SqlExpr::NormalizedUsersetSubject(inner) => {
                let src = inner.to_sql();
                format!(
                    "CASE WHEN position('#' in {}) > 0 THEN split_part({}, '#', 1) ELSE {} END",
                    src, src, src
                )
            }
            SqlExpr::CheckPermission(call) => call.to_sql(),
        }
    }
}

fn render_bool_chain(children: &[SqlExpr], op: &str, unit: &str) -> String {
    match children.len() {
        0 => unit.to_string(),
        1 => children[0].to_sql(),
        _ => {
            let parts: Vec<String> = children.iter().map(|c| c.to_sql()).collect();
            format!("({})", parts.join(&format!(" {} ", op)))
        }
    }
}

impl ToSql for CheckPermissionCall {
    fn to_sql(&self) -> String {
        format!(
            "{}({}, {}, {}, {}, {}, {})",
            self.function,
            self.subject_type.to_sql(),
            self.subject_id.to_sql(),
            self.relation.to_sql(),
            self.object_type.to_sql(),
            self.object_id.to_sql(),
            self.visited.to_sql()
        )
    }
}

impl ToSql for TableExpr {
    fn to_sql(&self) -> String {
        match self {
            TableExpr::Named { name, alias } => match alias {
                Some(a) => format!("{} AS {}", name, a),
                None => name.clone(),
            },
            TableExpr::Values {
                alias,
                columns,
                rows,
            } => {
                let body = if rows.is_empty() {
                    // A NULL tuple of declared arity keeps column typing
                    // stable when no rows exist.
                    let nulls = vec!["NULL"; columns.len()].join(", ");
                    format!("(VALUES ({}))", nulls)
                } else {
                    let rows_sql: Vec<String> = rows
                        .iter()
                        .map(|row| {
                            let cells: Vec<String> = row.iter().map(|c| c.to_sql()).collect();
                            format!("{}({})", INDENT, cells.join(", "))
                        })
                        .collect();
                    format!("(VALUES\n{}\n)", rows_sql.join(",\n"))
                };
                format!("{} AS {}({})", body, alias, columns.join(", "))
            }
            TableExpr::Function { call, alias } => {
                format!("{} AS {}", call.to_sql(), alias)
            }
            TableExpr::Subquery { query, alias } => {
                format!("(\n{}\n) AS {}", indent_lines(&query.to_sql()), alias)
            }
        }
    }
}

impl ToSql for JoinClause {
    fn to_sql(&self) -> String {
        let keyword = match self.join_type {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Cross => "CROSS JOIN",
            JoinType::CrossLateral => "CROSS JOIN LATERAL",
        };
        match (&self.on, self.join_type) {
            // CROSS joins never carry ON; a missing ON elsewhere is also
            // rendered bare rather than inventing a condition.
            (Some(on), JoinType::Inner | JoinType::Left) => {
                format!("{} {} ON {}", keyword, self.table.to_sql(), on.to_sql())
            }
            _ => format!("{} {}", keyword, self.table.to_sql()),
        }
    }
}

impl ToSql for OrderByExpr {
    fn to_sql(&self) -> String {
        match self.direction {
            OrderDirection::Asc => self.expr.to_sql(),
            OrderDirection::Desc => format!("{} DESC", self.expr.to_sql()),
        }
    }
}

impl ToSql for SelectStmt {
    fn to_sql(&self) -> String {
        let mut out = String::from("SELECT ");
        if self.distinct {
            out.push_str("DISTINCT ");
        }
        if self.columns.is_empty() {
            out.push('1');
        } else {
            let cols: Vec<String> = self.columns.iter().map(|c| c.to_sql()).collect();
            out.push_str(&cols.join(", "));
        }
        if let Some(from) = &self.from {
            out.push_str("\nFROM ");
            out.push_str(&from.to_sql());
        }
        for join in &self.joins {
            out.push('\n');
            out.push_str(&join.to_sql());
        }
        if let Some(where_clause) = &self.where_clause {
            out.push_str("\nWHERE ");
            out.push_str(&where_clause.to_sql());
        }
        if !self.order_by.is_empty() {
            let items: Vec<String> = self.order_by.iter().map(|o| o.to_sql()).collect();
            out.push_str("\nORDER BY ");
            out.push_str(&items.join(", "));
        }
        if let Some(limit) = &self.limit {
            out.push_str("\nLIMIT ");
            out.push_str(&limit.to_sql());
        }
        out
    }
}

impl ToSql for UnionAll {
    fn to_sql(&self) -> String {
        self.0
            .iter()
            .map(|q| q.to_sql())
            .collect::<Vec<_>>()
            .join("\nUNION ALL\n")
    }
}

impl ToSql for IntersectSubquery {
    fn to_sql(&self) -> String {
        self.0
            .iter()
            .map(|q| q.to_sql())
            .collect::<Vec<_>>()
            .join("\nINTERSECT\n")
    }
}

impl ToSql for CteDefinition {
    fn to_sql(&self) -> String {
        let columns = if self.columns.is_empty() {
            String::new()
        } else {
            format!("({})", self.columns.join(", "))
        };
        format!(
            "{}{} AS (\n{}\n)",
            self.name,
            columns,
            indent_lines(&self.body.to_sql())
        )
    }
}

impl ToSql for WithCte {
    fn to_sql(&self) -> String {
        let keyword = if self.recursive {
            "WITH RECURSIVE "
        } else {
            "WITH "
        };
        let ctes: Vec<String> = self.ctes.iter().map(|c| c.to_sql()).collect();
        format!("{}{}\n{}", keyword, ctes.join(",\n"), self.body.to_sql())
    }
}

impl ToSql for SqlQuery {
    fn to_sql(&self) -> String {
        match self {
            SqlQuery::Select(select) => select.to_sql(),
            SqlQuery::Union(union) => union.to_sql(),
            SqlQuery::Intersect(intersect) => intersect.to_sql(),
            SqlQuery::With(with) => with.to_sql(),
        }
    }
}

impl ToSql for FunctionArg {
    fn to_sql(&self) -> String {
        match &self.default {
            Some(default) => format!("{} {} DEFAULT {}", self.name, self.sql_type, default.to_sql()),
            None => format!("{} {}", self.name, self.sql_type),
        }
    }
}

impl ToSql for LocalDeclaration {
    fn to_sql(&self) -> String {
        match &self.initial {
            Some(initial) => format!("{} {} := {};", self.name, self.sql_type, initial.to_sql()),
            None => format!("{} {};", self.name, self.sql_type),
        }
    }
}

impl ToSql for PlpgsqlStmt {
    fn to_sql(&self) -> String {
        match self {
            PlpgsqlStmt::Return(expr) => format!("RETURN {};", expr.to_sql()),
            PlpgsqlStmt::ReturnQuery(query) => {
                format!("RETURN QUERY\n{};", query.to_sql())
            }
            PlpgsqlStmt::ReturnNothing => "RETURN;".to_string(),
            PlpgsqlStmt::Assign { name, value } => format!("{} := {};", name, value.to_sql()),
            PlpgsqlStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let mut out = format!("IF {} THEN\n", cond.to_sql());
                out.push_str(&indent_lines(&render_stmt_block(then_body)));
                if !else_body.is_empty() {
                    out.push_str("\nELSE\n");
                    out.push_str(&indent_lines(&render_stmt_block(else_body)));
                }
                out.push_str("\nEND IF;");
                out
            }
            PlpgsqlStmt::Raise { message, errcode } => format!(
                "RAISE EXCEPTION {} USING ERRCODE = {};",
                quote_string_literal(message),
                quote_string_literal(errcode)
            ),
            PlpgsqlStmt::Raw(sql) => sql.clone(),
            PlpgsqlStmt::Comment(text) => format!("-- {}", text),
        }
    }
}

fn render_stmt_block(stmts: &[PlpgsqlStmt]) -> String {
    stmts
        .iter()
        .map(|s| s.to_sql())
        .collect::<Vec<_>>()
        .join("\n")
}

impl ToSql for PlpgsqlFunction {
    fn to_sql(&self) -> String {
        let mut out = String::new();
        for comment in &self.header_comments {
            out.push_str(&format!("-- {}\n", comment));
        }
        let args: Vec<String> = self.args.iter().map(|a| a.to_sql()).collect();
        out.push_str(&format!(
            "CREATE OR REPLACE FUNCTION {}({})\n",
            self.name,
            args.join(", ")
        ));
        out.push_str(&format!("RETURNS {} AS $$\n", self.returns));
        if !self.declarations.is_empty() {
            out.push_str("DECLARE\n");
            for declaration in &self.declarations {
                out.push_str(&format!("{}{}\n", INDENT, declaration.to_sql()));
            }
        }
        out.push_str("BEGIN\n");
        out.push_str(&indent_lines(&render_stmt_block(&self.body)));
        out.push_str("\nEND;\n");
        let rows = match self.rows_estimate {
            Some(n) => format!(" ROWS {}", n),
            None => String::new(),
        };
        out.push_str(&format!(
            "$$ LANGUAGE plpgsql {}{};\n",
            self.volatility.keyword(),
            rows
        ));
        out
    }
}
