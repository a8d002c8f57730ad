//! Wildcard handling for subject listings.
//!
//! When a wildcard grant exists for the relation, the raw union would
//! return only explicitly-granted subjects plus the `*` row itself. The
//! tail keeps `*`, and keeps named subjects only when they hold access
//! that does not derive from the wildcard (probed via the no-wildcard
//! check shim).

use crate::sql_ir::{
    CteDefinition, JoinClause, SelectStmt, SqlExpr, SqlQuery, TableExpr, TupleQuery,
};
use crate::utils::CHECK_DISPATCHER_NO_WILDCARD;

use super::plan::ListPlan;

pub(crate) const BASE_RESULTS_CTE: &str = "base_results";
pub(crate) const HAS_WILDCARD_CTE: &str = "has_wildcard";

/// `has_wildcard` CTE: one boolean row, TRUE when a `*` grant exists on
/// the object for the direct relation set.
pub(crate) fn has_wildcard_cte(plan: &ListPlan) -> CteDefinition {
    let probe = TupleQuery::new("w")
        .object_type(&plan.object_type)
        .relations(&plan.direct_relations)
        .object_id(SqlExpr::param("p_object_id"))
        .subject_type(SqlExpr::param("p_subject_type"))
        .filter(SqlExpr::column("w", "subject_id").is_wildcard());
    CteDefinition::new(
        HAS_WILDCARD_CTE,
        Vec::new(),
        SqlQuery::Select(SelectStmt {
            columns: vec![SqlExpr::exists(probe.build()).aliased("has_wildcard")],
            ..SelectStmt::new()
        }),
    )
}

/// Tail selector over the base results and the wildcard flag.
pub(crate) fn wildcard_tail_select(plan: &ListPlan, source_cte: &str) -> SelectStmt {
    let subject = SqlExpr::column("br", "subject_id");
    let no_wildcard_probe = SqlExpr::call(
        CHECK_DISPATCHER_NO_WILDCARD,
        vec![
            SqlExpr::param("p_subject_type"),
            subject.clone(),
            SqlExpr::string(&plan.relation),
            SqlExpr::string(&plan.object_type),
            SqlExpr::param("p_object_id"),
        ],
    )
    .eq(SqlExpr::int(1));

    SelectStmt {
        columns: vec![subject.clone()],
        from: Some(TableExpr::named_as(source_cte, "br")),
        joins: vec![JoinClause::cross(TableExpr::named_as(
            HAS_WILDCARD_CTE,
            "hw",
        ))],
        where_clause: Some(SqlExpr::or(vec![
            SqlExpr::column("hw", "has_wildcard").negate(),
            subject.clone().is_wildcard(),
            SqlExpr::and(vec![
                subject.clone().not_eq(SqlExpr::string("*")),
                no_wildcard_probe,
            ]),
        ])),
        ..SelectStmt::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_ir::ToSql;

    fn plan() -> ListPlan {
        ListPlan {
            object_type: "doc".into(),
            relation: "viewer".into(),
            function_name: "list_doc_viewer_subjects".into(),
            direction: super::super::plan::ListDirection::Subjects,
            strategy: crate::schema_analyzer::ListStrategy::Userset,
            direct_relations: vec!["viewer".into()],
            complex_closure_relations: vec![],
            intersection_closure_relations: vec![],
            all_satisfying_relations: vec!["viewer".into()],
            allowed_subject_types: vec!["user".into()],
            userset_patterns: vec![],
            parent_relations: vec![],
            intersection_groups: vec![],
            exclusions: Default::default(),
            indirect_anchor: vec![],
            has_wildcard: true,
            has_direct: true,
            list_allowed: true,
            use_cte_exclusion: false,
        }
    }

    #[test]
    fn tail_probes_no_wildcard_check() {
        let sql = wildcard_tail_select(&plan(), BASE_RESULTS_CTE).to_sql();
        assert!(sql.contains("CROSS JOIN has_wildcard AS hw"));
        assert!(sql.contains("(NOT hw.has_wildcard)"));
        assert!(sql.contains("(br.subject_id = '*')"));
        assert!(sql.contains(
            "check_permission_no_wildcard(p_subject_type, br.subject_id, 'viewer', 'doc', p_object_id)"
        ));
    }

    #[test]
    fn wildcard_probe_filters_star_row() {
        let sql = has_wildcard_cte(&plan()).to_sql();
        assert!(sql.starts_with("has_wildcard AS (\n"));
        assert!(sql.contains("(w.subject_id = '*')"));
    }
}
