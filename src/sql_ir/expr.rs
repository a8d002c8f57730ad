//! SQL expression variants.
//!
//! The closed expression family. Constructors at the bottom keep block
//! builders terse; none of them allocate more than the tree they return.

use serde::{Deserialize, Serialize};

use super::stmt::SelectStmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

impl CompareOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::LtEq => "<=",
            CompareOp::GtEq => ">=",
        }
    }
}

/// A call into the recursive permission dispatcher.
///
/// Rendered as
/// `check_permission_internal(subject_type, subject_id, relation, object_type, object_id, visited)`.
/// The `visited` argument defaults to the empty `text[]` when callers do
/// not thread an accumulator through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckPermissionCall {
    pub function: String,
    pub subject_type: Box<SqlExpr>,
    pub subject_id: Box<SqlExpr>,
    pub relation: Box<SqlExpr>,
    pub object_type: Box<SqlExpr>,
    pub object_id: Box<SqlExpr>,
    pub visited: Box<SqlExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlExpr {
    /// Reference to a function parameter (`p_subject_id`).
    Param(String),
    /// Column reference with optional table qualifier.
    Column {
        table: Option<String>,
        name: String,
    },
    StringLit(String),
    IntLit(i64),
    BoolLit(bool),
    Null,
    /// Raw SQL text. Escape hatch: never fed with schema-derived or other
    /// user-controlled text.
    Raw(String),
    FnCall {
        name: String,
        args: Vec<SqlExpr>,
    },
    Alias {
        expr: Box<SqlExpr>,
        alias: String,
    },
    Paren(Box<SqlExpr>),
    /// String concatenation chain (`a || b || c`).
    Concat(Vec<SqlExpr>),
    /// `position(needle in haystack)`
    Position {
        needle: Box<SqlExpr>,
        haystack: Box<SqlExpr>,
    },
    /// `substring(source from start [for length])`
    Substring {
        source: Box<SqlExpr>,
        start: Box<SqlExpr>,
        length: Option<Box<SqlExpr>>,
    },
    Compare {
        op: CompareOp,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    /// `(left + right)` — cursor limits and recursion depths.
    Add {
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    /// `expr IN (items)` / `expr NOT IN (items)`. An empty list renders
    /// as the comparison's unit (`FALSE` for IN, `TRUE` for NOT IN).
    InList {
        expr: Box<SqlExpr>,
        items: Vec<SqlExpr>,
        negated: bool,
    },
    /// Conjunction. Empty renders `TRUE`, singleton renders the child.
    And(Vec<SqlExpr>),
    /// Disjunction. Empty renders `FALSE`, singleton renders the child.
    Or(Vec<SqlExpr>),
    Not(Box<SqlExpr>),
    Exists {
        query: Box<SelectStmt>,
        negated: bool,
    },
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
    /// `ARRAY[..]`; empty renders `ARRAY[]::text[]` so the expression
    /// stays typed.
    ArrayLit(Vec<SqlExpr>),
    /// `(array || element)`
    ArrayAppend {
        array: Box<SqlExpr>,
        element: Box<SqlExpr>,
    },
    /// `(left || right)` over two array expressions.
    ArrayConcat {
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    /// `array_length(expr, 1)`
    ArrayLength(Box<SqlExpr>),
    /// `expr = ANY(array)`
    AnyArray {
        expr: Box<SqlExpr>,
        array: Box<SqlExpr>,
    },
    CaseWhen {
        branches: Vec<(SqlExpr, SqlExpr)>,
        else_expr: Option<Box<SqlExpr>>,
    },
    /// Scalar subquery.
    Subquery(Box<SelectStmt>),

    // Userset decomposition helpers. Subjects encoded `object_id#relation`
    // are split with these; keeping them as named variants keeps every
    // split site identical in the emitted text.
    /// `split_part(expr, '#', 1)`
    SplitObjectId(Box<SqlExpr>),
    /// `split_part(expr, '#', 2)`
    SplitRelation(Box<SqlExpr>),
    /// `(position('#' in expr) > 0)`
    HasUserset(Box<SqlExpr>),
    /// `(expr = '*')`
    IsWildcard(Box<SqlExpr>),
    /// `substring(expr from position('#' in expr) + 1)`
    SubstringUsersetRelation(Box<SqlExpr>),
    /// Object-id part of a subject whether or not it carries a userset
    /// suffix: `CASE WHEN position('#' in expr) > 0 THEN split_part(expr, '#', 1) ELSE expr END`
    NormalizedUsersetSubject(Box<SqlExpr>),

    CheckPermission(CheckPermissionCall),
}

impl SqlExpr {
    pub fn param(name: impl Into<String>) -> Self {
        SqlExpr::Param(name.into())
    }

    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        SqlExpr::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn bare_column(name: impl Into<String>) -> Self {
        SqlExpr::Column {
            table: None,
            name: name.into(),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        SqlExpr::StringLit(value.into())
    }

    pub fn int(value: i64) -> Self {
        SqlExpr::IntLit(value)
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        SqlExpr::Raw(sql.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<SqlExpr>) -> Self {
        SqlExpr::FnCall {
            name: name.into(),
            args,
        }
    }

    pub fn aliased(self, alias: impl Into<String>) -> Self {
        SqlExpr::Alias {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    pub fn compare(self, op: CompareOp, right: SqlExpr) -> Self {
        SqlExpr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn eq(self, right: SqlExpr) -> Self {
        self.compare(CompareOp::Eq, right)
    }

    pub fn plus(self, right: SqlExpr) -> Self {
        SqlExpr::Add {
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn not_eq(self, right: SqlExpr) -> Self {
        self.compare(CompareOp::NotEq, right)
    }

    pub fn gt(self, right: SqlExpr) -> Self {
        self.compare(CompareOp::Gt, right)
    }

    pub fn gt_eq(self, right: SqlExpr) -> Self {
        self.compare(CompareOp::GtEq, right)
    }

    pub fn lt(self, right: SqlExpr) -> Self {
        self.compare(CompareOp::Lt, right)
    }

    pub fn in_strings<I, S>(self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SqlExpr::InList {
            expr: Box::new(self),
            items: items.into_iter().map(|s| SqlExpr::string(s)).collect(),
            negated: false,
        }
    }

    pub fn in_list(self, items: Vec<SqlExpr>) -> Self {
        SqlExpr::InList {
            expr: Box::new(self),
            items,
            negated: false,
        }
    }

    pub fn not_in_list(self, items: Vec<SqlExpr>) -> Self {
        SqlExpr::InList {
            expr: Box::new(self),
            items,
            negated: true,
        }
    }

    pub fn and(children: Vec<SqlExpr>) -> Self {
        SqlExpr::And(children)
    }

    pub fn or(children: Vec<SqlExpr>) -> Self {
        SqlExpr::Or(children)
    }

    pub fn negate(self) -> Self {
        SqlExpr::Not(Box::new(self))
    }

    pub fn exists(query: SelectStmt) -> Self {
        SqlExpr::Exists {
            query: Box::new(query),
            negated: false,
        }
    }

    pub fn not_exists(query: SelectStmt) -> Self {
        SqlExpr::Exists {
            query: Box::new(query),
            negated: true,
        }
    }

    pub fn is_null(self) -> Self {
        SqlExpr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        SqlExpr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn any_of(self, array: SqlExpr) -> Self {
        SqlExpr::AnyArray {
            expr: Box::new(self),
            array: Box::new(array),
        }
    }

    /// The empty `text[]`; default for visited accumulators.
    pub fn empty_text_array() -> Self {
        SqlExpr::ArrayLit(Vec::new())
    }

    pub fn subquery(query: SelectStmt) -> Self {
        SqlExpr::Subquery(Box::new(query))
    }

    pub fn split_object_id(self) -> Self {
        SqlExpr::SplitObjectId(Box::new(self))
    }

    pub fn split_relation(self) -> Self {
        SqlExpr::SplitRelation(Box::new(self))
    }

    pub fn has_userset(self) -> Self {
        SqlExpr::HasUserset(Box::new(self))
    }

    pub fn is_wildcard(self) -> Self {
        SqlExpr::IsWildcard(Box::new(self))
    }
}

impl CheckPermissionCall {
    /// Call with an explicit visited accumulator.
    pub fn new(
        function: impl Into<String>,
        subject_type: SqlExpr,
        subject_id: SqlExpr,
        relation: SqlExpr,
        object_type: SqlExpr,
        object_id: SqlExpr,
        visited: SqlExpr,
    ) -> Self {
        Self {
            function: function.into(),
            subject_type: Box::new(subject_type),
            subject_id: Box::new(subject_id),
            relation: Box::new(relation),
            object_type: Box::new(object_type),
            object_id: Box::new(object_id),
            visited: Box::new(visited),
        }
    }

    /// Call starting a fresh resolution (empty visited array).
    pub fn fresh(
        function: impl Into<String>,
        subject_type: SqlExpr,
        subject_id: SqlExpr,
        relation: SqlExpr,
        object_type: SqlExpr,
        object_id: SqlExpr,
    ) -> Self {
        Self::new(
            function,
            subject_type,
            subject_id,
            relation,
            object_type,
            object_id,
            SqlExpr::empty_text_array(),
        )
    }

    pub fn into_expr(self) -> SqlExpr {
        SqlExpr::CheckPermission(self)
    }

    /// `call(...) = 1` — the usual way a check call appears in a predicate.
    pub fn allows(self) -> SqlExpr {
        self.into_expr().eq(SqlExpr::int(1))
    }
}
