//! Shared list blocks for the Direct/Userset strategy family.
//!
//! Each builder returns a finished one-column block; strategies combine
//! them into a [`BlockSet`], optionally add their own CTE machinery, and
//! hand the union to pagination.

use crate::inline_data::InlineData;
use crate::schema_analyzer::UsersetPattern;
use crate::sql_ir::{
    CheckPermissionCall, JoinClause, SelectStmt, SqlExpr, SqlQuery, TableExpr, TupleQuery,
    TUPLES_TABLE,
};

use super::block_set::BlockSet;
use super::exclusion::{exclusion_predicate, ExclusionContext};
use super::plan::{ListDirection, ListPlan};

pub(crate) struct ListBlockBuilder<'a> {
    pub plan: &'a ListPlan,
    pub inline: &'a InlineData,
}

impl<'a> ListBlockBuilder<'a> {
    pub fn new(plan: &'a ListPlan, inline: &'a InlineData) -> Self {
        Self { plan, inline }
    }

    /// Anti-predicate for a candidate object column; None when the plan
    /// has no exclusions.
    fn object_keep_predicate(&self, object_col: SqlExpr) -> Option<SqlExpr> {
        exclusion_predicate(
            self.plan,
            &self.plan.exclusions,
            &ExclusionContext::for_object(object_col),
        )
        .map(SqlExpr::negate)
    }

    /// Anti-predicate for a candidate subject column; suppressed when the
    /// `excluded_subjects` CTE takes over.
    fn subject_keep_predicate(&self, subject_col: SqlExpr) -> Option<SqlExpr> {
        if self.plan.use_cte_exclusion {
            return None;
        }
        exclusion_predicate(
            self.plan,
            &self.plan.exclusions,
            &ExclusionContext::for_subject(subject_col),
        )
        .map(SqlExpr::negate)
    }

    // ---- objects ----------------------------------------------------

    pub fn objects_block_set(&self) -> BlockSet {
        let mut set = BlockSet::new(ListDirection::Objects);
        // Without a plain subject type anywhere in the closure the direct
        // block can never match a caller.
        if (self.plan.has_direct || self.plan.direct_relations.len() > 1)
            && !self.plan.allowed_subject_types.is_empty()
        {
            set.push(self.direct_objects_block());
        }
        if self.plan.has_userset_patterns() {
            set.push(self.userset_subject_objects_block());
            set.push(self.self_candidate_objects_block());
        }
        for pattern in &self.plan.userset_patterns {
            set.push(self.userset_pattern_objects_block(pattern));
        }
        for member in &self.plan.complex_closure_relations {
            set.push(self.complex_closure_objects_block(member));
        }
        for member in &self.plan.intersection_closure_relations {
            set.push(self.compose_objects_block(member));
        }
        set
    }

    /// Plain tuple lookup over the direct relation set.
    pub fn direct_objects_block(&self) -> SqlQuery {
        let query = TupleQuery::new("t");
        let object_col = query.col("object_id");
        let mut query = query
            .distinct()
            .select(object_col.clone())
            .object_type(&self.plan.object_type)
            .relations(&self.plan.direct_relations)
            .subject_type(SqlExpr::param("p_subject_type"))
            .filter(
                SqlExpr::param("p_subject_type").in_strings(
                    self.plan
                        .allowed_subject_types
                        .iter()
                        .map(|t| t.to_string()),
                ),
            )
            .subject_id_matches(SqlExpr::param("p_subject_id"), self.plan.has_wildcard);
        if let Some(keep) = self.object_keep_predicate(object_col) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    /// Grants naming the caller itself as a userset subject; no
    /// subject-type guard because userset callers use the grantee type.
    fn userset_subject_objects_block(&self) -> SqlQuery {
        let query = TupleQuery::new("t");
        let object_col = query.col("object_id");
        let mut query = query
            .distinct()
            .select(object_col.clone())
            .object_type(&self.plan.object_type)
            .relations(&self.plan.direct_relations)
            .subject_type(SqlExpr::param("p_subject_type"))
            .filter(SqlExpr::param("p_subject_id").has_userset())
            .filter(query_subject_eq("t"));
        if let Some(keep) = self.object_keep_predicate(object_col) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    /// A userset caller of this object's own type satisfies the relation
    /// on the object its id names, when its relation is in the closure.
    fn self_candidate_objects_block(&self) -> SqlQuery {
        let caller = SqlExpr::param("p_subject_id");
        let object_expr = caller.clone().split_object_id();
        let mut conditions = vec![
            SqlExpr::param("p_subject_type").eq(SqlExpr::string(&self.plan.object_type)),
            caller.clone().has_userset(),
            caller
                .split_relation()
                .eq(SqlExpr::column("closure", "satisfying_relation")),
        ];
        if let Some(keep) = self.object_keep_predicate(object_expr.clone()) {
            conditions.push(keep);
        }
        SqlQuery::Select(SelectStmt {
            distinct: true,
            columns: vec![object_expr.aliased("object_id")],
            from: Some(self.inline.closure_values(
                &self.plan.object_type,
                &self.plan.relation,
                "closure",
            )),
            where_clause: Some(SqlExpr::and(conditions)),
            ..SelectStmt::new()
        })
    }

    fn userset_pattern_objects_block(&self, pattern: &UsersetPattern) -> SqlQuery {
        if pattern.is_complex {
            self.complex_userset_pattern_objects_block(pattern)
        } else {
            self.simple_userset_pattern_objects_block(pattern)
        }
    }

    fn simple_userset_pattern_objects_block(&self, pattern: &UsersetPattern) -> SqlQuery {
        let granted = TupleQuery::new("granted");
        let object_col = granted.col("object_id");
        let granted_subject = granted.col("subject_id");

        let membership_subject = SqlExpr::column("membership", "subject_id");
        let membership_match = if pattern.has_wildcard && self.plan.has_wildcard {
            SqlExpr::or(vec![
                membership_subject.clone().eq(SqlExpr::param("p_subject_id")),
                membership_subject.clone().is_wildcard(),
            ])
        } else {
            membership_subject.clone().eq(SqlExpr::param("p_subject_id"))
        };
        let join = JoinClause::inner(
            TableExpr::named_as(TUPLES_TABLE, "membership"),
            SqlExpr::and(vec![
                SqlExpr::column("membership", "object_type")
                    .eq(SqlExpr::string(&pattern.subject_type)),
                SqlExpr::column("membership", "object_id")
                    .eq(granted_subject.clone().split_object_id()),
                SqlExpr::column("membership", "relation").in_strings(
                    pattern.satisfying_relations.iter().map(|r| r.to_string()),
                ),
                SqlExpr::column("membership", "subject_type").eq(SqlExpr::param("p_subject_type")),
                membership_match,
            ]),
        );

        let mut query = granted
            .distinct()
            .select(object_col.clone())
            .object_type(&self.plan.object_type)
            .relations(&self.plan.direct_relations)
            .subject_type(SqlExpr::string(&pattern.subject_type))
            .filter(granted_subject.clone().has_userset())
            .filter(
                granted_subject
                    .split_relation()
                    .eq(SqlExpr::string(&pattern.subject_relation)),
            )
            .join(join);
        if let Some(keep) = self.object_keep_predicate(object_col) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    fn complex_userset_pattern_objects_block(&self, pattern: &UsersetPattern) -> SqlQuery {
        let granted = TupleQuery::new("granted");
        let object_col = granted.col("object_id");
        let subject = granted.col("subject_id");
        let call = CheckPermissionCall::fresh(
            self.plan.internal_check_dispatcher(),
            SqlExpr::param("p_subject_type"),
            SqlExpr::param("p_subject_id"),
            subject.clone().split_relation(),
            SqlExpr::string(&pattern.subject_type),
            subject.clone().split_object_id(),
        );
        let mut query = granted
            .distinct()
            .select(object_col.clone())
            .object_type(&self.plan.object_type)
            .relations(&self.plan.direct_relations)
            .subject_type(SqlExpr::string(&pattern.subject_type))
            .filter(subject.clone().has_userset())
            .filter(
                subject
                    .split_relation()
                    .eq(SqlExpr::string(&pattern.subject_relation)),
            )
            .filter(call.allows());
        if let Some(keep) = self.object_keep_predicate(object_col) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    /// Candidate objects validated by a recursive check on the complex
    /// closure member.
    fn complex_closure_objects_block(&self, member: &str) -> SqlQuery {
        let query = TupleQuery::new("t");
        let object_col = query.col("object_id");
        let call = CheckPermissionCall::fresh(
            self.plan.internal_check_dispatcher(),
            SqlExpr::param("p_subject_type"),
            SqlExpr::param("p_subject_id"),
            SqlExpr::string(member),
            SqlExpr::string(&self.plan.object_type),
            object_col.clone(),
        );
        let mut query = query
            .distinct()
            .select(object_col.clone())
            .object_type(&self.plan.object_type)
            .relations(&self.plan.all_satisfying_relations)
            .filter(call.allows());
        if let Some(keep) = self.object_keep_predicate(object_col) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    /// Compose the intersectional member's own list function.
    fn compose_objects_block(&self, member: &str) -> SqlQuery {
        let call = SqlExpr::call(
            crate::utils::list_objects_function_name(&self.plan.object_type, member),
            vec![
                SqlExpr::param("p_subject_type"),
                SqlExpr::param("p_subject_id"),
                SqlExpr::Null,
                SqlExpr::Null,
            ],
        );
        let object_col = SqlExpr::column("l", "object_id");
        let mut conditions = Vec::new();
        if let Some(keep) = self.object_keep_predicate(object_col.clone()) {
            conditions.push(keep);
        }
        SqlQuery::Select(SelectStmt {
            distinct: true,
            columns: vec![object_col],
            from: Some(TableExpr::function(call, "l")),
            where_clause: if conditions.is_empty() {
                None
            } else {
                Some(SqlExpr::and(conditions))
            },
            ..SelectStmt::new()
        })
    }

    // ---- subjects ---------------------------------------------------

    /// `object_cond` maps the tuple's object column to the scope
    /// predicate (parameter equality by default; ancestor membership in
    /// the recursive strategy).
    pub fn subjects_block_set<F>(&self, object_cond: &F) -> BlockSet
    where
        F: Fn(SqlExpr) -> SqlExpr,
    {
        let mut set = BlockSet::new(ListDirection::Subjects);
        if self.plan.has_direct || self.plan.direct_relations.len() > 1 {
            set.push(self.direct_subjects_block(object_cond));
        }
        if self.plan.has_userset_patterns() {
            set.push(self.compound_subject_type_block(object_cond));
        }
        for pattern in &self.plan.userset_patterns {
            set.push(self.userset_pattern_subjects_block(pattern, object_cond));
        }
        for member in &self.plan.complex_closure_relations {
            set.push(self.complex_closure_subjects_block(member));
        }
        for member in &self.plan.intersection_closure_relations {
            set.push(self.compose_subjects_block(member));
        }
        set
    }

    pub fn direct_subjects_block<F>(&self, object_cond: &F) -> SqlQuery
    where
        F: Fn(SqlExpr) -> SqlExpr,
    {
        let query = TupleQuery::new("t");
        let subject_col = query.col("subject_id");
        let mut query = query
            .distinct()
            .select(subject_col.clone())
            .object_type(&self.plan.object_type)
            .relations(&self.plan.direct_relations)
            .filter(object_cond(query_col("t", "object_id")))
            .subject_type(SqlExpr::param("p_subject_type"))
            .filter(subject_col.clone().has_userset().negate());
        if let Some(keep) = self.subject_keep_predicate(subject_col) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    /// Userset grants surfaced when the caller asks for a compound
    /// subject type (`group#member`): returns the userset object ids.
    fn compound_subject_type_block<F>(&self, object_cond: &F) -> SqlQuery
    where
        F: Fn(SqlExpr) -> SqlExpr,
    {
        let query = TupleQuery::new("t");
        let granted_subject = query.col("subject_id");
        let subject_expr = granted_subject.clone().split_object_id();
        let compound = SqlExpr::param("p_subject_type");
        let mut query = query
            .distinct()
            .select(subject_expr.clone().aliased("subject_id"))
            .object_type(&self.plan.object_type)
            .relations(&self.plan.direct_relations)
            .filter(object_cond(query_col("t", "object_id")))
            .filter(compound.clone().has_userset())
            .filter(
                query_col("t", "subject_type").eq(compound.clone().split_object_id()),
            )
            .filter(granted_subject.clone().has_userset())
            .filter(
                granted_subject
                    .split_relation()
                    .eq(compound.split_relation()),
            );
        if let Some(keep) = self.subject_keep_predicate(subject_expr) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    fn userset_pattern_subjects_block<F>(&self, pattern: &UsersetPattern, object_cond: &F) -> SqlQuery
    where
        F: Fn(SqlExpr) -> SqlExpr,
    {
        if pattern.is_complex {
            self.complex_userset_pattern_subjects_block(pattern, object_cond)
        } else {
            self.simple_userset_pattern_subjects_block(pattern, object_cond)
        }
    }

    /// Expand the userset grant through membership tuples.
    fn simple_userset_pattern_subjects_block<F>(
        &self,
        pattern: &UsersetPattern,
        object_cond: &F,
    ) -> SqlQuery
    where
        F: Fn(SqlExpr) -> SqlExpr,
    {
        let granted = TupleQuery::new("granted");
        let granted_subject = granted.col("subject_id");
        let membership_subject = SqlExpr::column("membership", "subject_id");

        let join = JoinClause::inner(
            TableExpr::named_as(TUPLES_TABLE, "membership"),
            SqlExpr::and(vec![
                SqlExpr::column("membership", "object_type")
                    .eq(SqlExpr::string(&pattern.subject_type)),
                SqlExpr::column("membership", "object_id")
                    .eq(granted_subject.clone().split_object_id()),
                SqlExpr::column("membership", "relation").in_strings(
                    pattern.satisfying_relations.iter().map(|r| r.to_string()),
                ),
                SqlExpr::column("membership", "subject_type").eq(SqlExpr::param("p_subject_type")),
                membership_subject.clone().has_userset().negate(),
            ]),
        );

        let mut query = granted
            .distinct()
            .select(membership_subject.clone())
            .object_type(&self.plan.object_type)
            .relations(&self.plan.direct_relations)
            .filter(object_cond(query_col("granted", "object_id")))
            .subject_type(SqlExpr::string(&pattern.subject_type))
            .filter(granted_subject.clone().has_userset())
            .filter(
                granted_subject
                    .split_relation()
                    .eq(SqlExpr::string(&pattern.subject_relation)),
            )
            .join(join);
        if let Some(keep) = self.subject_keep_predicate(membership_subject) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    /// Candidate subjects on the userset's object validated by a
    /// recursive check against the userset's relation.
    fn complex_userset_pattern_subjects_block<F>(
        &self,
        pattern: &UsersetPattern,
        object_cond: &F,
    ) -> SqlQuery
    where
        F: Fn(SqlExpr) -> SqlExpr,
    {
        let granted = TupleQuery::new("granted");
        let granted_subject = granted.col("subject_id");
        let candidate_subject = SqlExpr::column("candidate", "subject_id");

        let join = JoinClause::inner(
            TableExpr::named_as(TUPLES_TABLE, "candidate"),
            SqlExpr::and(vec![
                SqlExpr::column("candidate", "object_type")
                    .eq(SqlExpr::string(&pattern.subject_type)),
                SqlExpr::column("candidate", "object_id")
                    .eq(granted_subject.clone().split_object_id()),
                SqlExpr::column("candidate", "subject_type").eq(SqlExpr::param("p_subject_type")),
                candidate_subject.clone().has_userset().negate(),
            ]),
        );
        let call = CheckPermissionCall::fresh(
            self.plan.internal_check_dispatcher(),
            SqlExpr::param("p_subject_type"),
            candidate_subject.clone(),
            granted_subject.clone().split_relation(),
            SqlExpr::string(&pattern.subject_type),
            granted_subject.clone().split_object_id(),
        );

        let mut query = granted
            .distinct()
            .select(candidate_subject.clone())
            .object_type(&self.plan.object_type)
            .relations(&self.plan.direct_relations)
            .filter(object_cond(query_col("granted", "object_id")))
            .subject_type(SqlExpr::string(&pattern.subject_type))
            .filter(granted_subject.clone().has_userset())
            .filter(
                granted_subject
                    .split_relation()
                    .eq(SqlExpr::string(&pattern.subject_relation)),
            )
            .join(join)
            .filter(call.allows());
        if let Some(keep) = self.subject_keep_predicate(candidate_subject) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    fn complex_closure_subjects_block(&self, member: &str) -> SqlQuery {
        let query = TupleQuery::new("t");
        let subject_col = query.col("subject_id");
        let call = CheckPermissionCall::fresh(
            self.plan.internal_check_dispatcher(),
            SqlExpr::param("p_subject_type"),
            subject_col.clone(),
            SqlExpr::string(member),
            SqlExpr::string(&self.plan.object_type),
            SqlExpr::param("p_object_id"),
        );
        let mut query = query
            .distinct()
            .select(subject_col.clone())
            .object_type(&self.plan.object_type)
            .relations(&self.plan.all_satisfying_relations)
            .object_id(SqlExpr::param("p_object_id"))
            .subject_type(SqlExpr::param("p_subject_type"))
            .filter(subject_col.clone().has_userset().negate())
            .filter(call.allows());
        if let Some(keep) = self.subject_keep_predicate(subject_col) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    /// Link tuples whose parent object grants the target relation,
    /// validated per row by a recursive check. Base block for TTU edges
    /// the recursive CTE cannot absorb.
    pub fn ttu_check_objects_block(
        &self,
        linking_relation: &str,
        target_relation: &str,
        target_types: &[String],
    ) -> SqlQuery {
        let link = TupleQuery::new("link");
        let object_col = link.col("object_id");
        let call = CheckPermissionCall::fresh(
            self.plan.internal_check_dispatcher(),
            SqlExpr::param("p_subject_type"),
            SqlExpr::param("p_subject_id"),
            SqlExpr::string(target_relation),
            link.col("subject_type"),
            link.col("subject_id"),
        );
        let guard = link
            .col("subject_type")
            .in_strings(target_types.iter().map(|t| t.to_string()));
        let linking = [linking_relation.to_string()];
        let mut query = link
            .distinct()
            .select(object_col.clone())
            .object_type(&self.plan.object_type)
            .relations(&linking)
            .filter(guard)
            .filter(call.allows());
        if let Some(keep) = self.object_keep_predicate(object_col) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    /// Subjects of the target relation on each linked parent, fetched
    /// through the parent type's own subject listing.
    pub fn ttu_lateral_subjects_block(
        &self,
        linking_relation: &str,
        target_relation: &str,
        target_type: &str,
    ) -> SqlQuery {
        let link = TupleQuery::new("link");
        let lateral_call = SqlExpr::call(
            crate::utils::list_subjects_function_name(target_type, target_relation),
            vec![
                SqlExpr::column("link", "subject_id"),
                SqlExpr::param("p_subject_type"),
                SqlExpr::Null,
                SqlExpr::Null,
            ],
        );
        let subject_col = SqlExpr::column("l", "subject_id");
        let linking = [linking_relation.to_string()];
        let mut query = link
            .distinct()
            .select(subject_col.clone())
            .object_type(&self.plan.object_type)
            .relations(&linking)
            .object_id(SqlExpr::param("p_object_id"))
            .filter(SqlExpr::column("link", "subject_type").eq(SqlExpr::string(target_type)))
            .join(crate::sql_ir::JoinClause::cross_lateral(TableExpr::function(
                lateral_call,
                "l",
            )));
        if let Some(keep) = self.subject_keep_predicate(subject_col) {
            query = query.filter(keep);
        }
        SqlQuery::Select(query.build())
    }

    fn compose_subjects_block(&self, member: &str) -> SqlQuery {
        let call = SqlExpr::call(
            crate::utils::list_subjects_function_name(&self.plan.object_type, member),
            vec![
                SqlExpr::param("p_object_id"),
                SqlExpr::param("p_subject_type"),
                SqlExpr::Null,
                SqlExpr::Null,
            ],
        );
        let subject_col = SqlExpr::column("l", "subject_id");
        let mut conditions = Vec::new();
        if let Some(keep) = self.subject_keep_predicate(subject_col.clone()) {
            conditions.push(keep);
        }
        SqlQuery::Select(SelectStmt {
            distinct: true,
            columns: vec![subject_col],
            from: Some(TableExpr::function(call, "l")),
            where_clause: if conditions.is_empty() {
                None
            } else {
                Some(SqlExpr::and(conditions))
            },
            ..SelectStmt::new()
        })
    }
}

/// Subject equality with the caller's exact subject id.
fn query_subject_eq(alias: &str) -> SqlExpr {
    SqlExpr::column(alias, "subject_id").eq(SqlExpr::param("p_subject_id"))
}

fn query_col(alias: &str, name: &str) -> SqlExpr {
    SqlExpr::column(alias, name)
}

/// Default object scope for subjects: equality with `p_object_id`.
pub(crate) fn object_eq_param(col: SqlExpr) -> SqlExpr {
    col.eq(SqlExpr::param("p_object_id"))
}
