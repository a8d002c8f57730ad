use crate::inline_data::build_inline_data;
use crate::schema_analyzer::analyze;
use crate::schema_catalog::schema_types::test_support::*;
use crate::schema_catalog::{SchemaCatalog, TypeDefinition};
use crate::sql_ir::ToSql;

use super::{build_list_function, ListDirection, ListGeneratorError};

fn list_sql(
    types: Vec<TypeDefinition>,
    object_type: &str,
    relation: &str,
    direction: ListDirection,
) -> String {
    try_list_sql(types, object_type, relation, direction).unwrap()
}

fn try_list_sql(
    types: Vec<TypeDefinition>,
    object_type: &str,
    relation: &str,
    direction: ListDirection,
) -> Result<String, ListGeneratorError> {
    let catalog = SchemaCatalog::build(document(types)).unwrap();
    let analyses = analyze(&catalog).unwrap();
    let inline = build_inline_data(&analyses);
    let analysis = analyses.get(object_type, relation).unwrap();
    build_list_function(analysis, &inline, direction).map(|f| f.to_sql())
}

fn user_type() -> TypeDefinition {
    type_def("user", vec![])
}

fn plain_doc() -> Vec<TypeDefinition> {
    vec![
        user_type(),
        type_def("doc", vec![relation_def("viewer", direct(vec![subject_ref("user")]))]),
    ]
}

#[test]
fn direct_objects_function_shape() {
    let sql = list_sql(plain_doc(), "doc", "viewer", ListDirection::Objects);
    assert!(sql.contains("CREATE OR REPLACE FUNCTION list_doc_viewer_objects(p_subject_type text, p_subject_id text, p_limit integer DEFAULT NULL, p_after text DEFAULT NULL)"));
    assert!(sql.contains("RETURNS TABLE(object_id text, next_cursor text) AS $$"));
    assert!(sql.contains("SELECT DISTINCT t.object_id"));
    assert!(sql.contains("(t.object_type = 'doc')"));
    assert!(sql.contains("(t.relation IN ('viewer'))"));
    assert!(sql.contains("(t.subject_type = p_subject_type)"));
    assert!(sql.contains("(p_subject_type IN ('user'))"));
    assert!(sql.contains("RETURN QUERY"));
    // Pagination plumbing wraps the block.
    assert!(sql.contains("WITH results AS ("));
    assert!(sql.contains("ELSE (p_limit + 1)"));
    assert!(sql.contains("AS next_cursor"));
    assert!(sql.ends_with("$$ LANGUAGE plpgsql STABLE ROWS 100;\n"));
}

#[test]
fn direct_subjects_function_shape() {
    let sql = list_sql(plain_doc(), "doc", "viewer", ListDirection::Subjects);
    assert!(sql.contains("CREATE OR REPLACE FUNCTION list_doc_viewer_subjects(p_object_id text, p_subject_type text, p_limit integer DEFAULT NULL, p_after text DEFAULT NULL)"));
    assert!(sql.contains("RETURNS TABLE(subject_id text, next_cursor text) AS $$"));
    assert!(sql.contains("SELECT DISTINCT t.subject_id"));
    assert!(sql.contains("(t.object_id = p_object_id)"));
    // Userset-shaped rows never surface as plain subjects.
    assert!(sql.contains("(NOT (position('#' in t.subject_id) > 0))"));
}

#[test]
fn implication_widens_relation_filter() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "doc",
                vec![
                    relation_def("editor", direct(vec![subject_ref("user")])),
                    relation_def(
                        "viewer",
                        union(vec![direct(vec![subject_ref("user")]), implied("editor")]),
                    ),
                ],
            ),
        ],
        "doc",
        "viewer",
        ListDirection::Objects,
    );
    assert!(sql.contains("(t.relation IN ('editor', 'viewer'))"));
}

#[test]
fn userset_objects_include_membership_join_and_self_candidate() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "group",
                vec![relation_def("member", direct(vec![subject_ref("user")]))],
            ),
            type_def(
                "doc",
                vec![relation_def("viewer", direct(vec![userset_ref("group", "member")]))],
            ),
        ],
        "doc",
        "viewer",
        ListDirection::Objects,
    );
    assert!(sql.contains("JOIN melange_tuples AS membership"));
    assert!(sql.contains("(membership.relation IN ('member'))"));
    assert!(sql.contains("split_part(granted.subject_id, '#', 1)"));
    // Self-candidate block over the inline closure rows.
    assert!(sql.contains("AS closure(satisfying_relation)"));
    assert!(sql.contains("split_part(p_subject_id, '#', 1) AS object_id"));
}

#[test]
fn recursive_objects_emit_depth_capped_cte() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "folder",
                vec![
                    relation_def("parent", direct(vec![subject_ref("folder")])),
                    relation_def(
                        "viewer",
                        union(vec![direct(vec![subject_ref("user")]), ttu("parent", "viewer")]),
                    ),
                ],
            ),
        ],
        "folder",
        "viewer",
        ListDirection::Objects,
    );
    assert!(sql.contains("WITH RECURSIVE accessible(object_id, depth) AS ("));
    assert!(sql.contains("(child.relation IN ('parent'))"));
    assert!(sql.contains("(child.subject_type = 'folder')"));
    assert!(sql.contains("(child.subject_id = a.object_id)"));
    assert!(sql.contains("(a.depth < 25)"));
    assert!(sql.contains("(a.depth + 1) AS depth"));
    assert!(sql.contains("SELECT DISTINCT accessible.object_id"));
}

#[test]
fn recursive_subjects_walk_ancestors() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "folder",
                vec![
                    relation_def("parent", direct(vec![subject_ref("folder")])),
                    relation_def(
                        "viewer",
                        union(vec![direct(vec![subject_ref("user")]), ttu("parent", "viewer")]),
                    ),
                ],
            ),
        ],
        "folder",
        "viewer",
        ListDirection::Subjects,
    );
    assert!(sql.contains("WITH RECURSIVE ancestors(object_id, depth) AS ("));
    assert!(sql.contains("SELECT p_object_id AS object_id, 0 AS depth"));
    assert!(sql.contains("(link.object_id = a.object_id)"));
    assert!(sql.contains("EXISTS (\n"));
    assert!(sql.contains("(anc.object_id = t.object_id)"));
}

#[test]
fn exclusion_appears_in_primary_blocks() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "doc",
                vec![
                    relation_def("blocked", direct(vec![subject_ref("user")])),
                    relation_def(
                        "viewer",
                        but_not(direct(vec![subject_ref("user")]), implied("blocked")),
                    ),
                ],
            ),
        ],
        "doc",
        "viewer",
        ListDirection::Objects,
    );
    assert!(sql.contains("(NOT EXISTS ("));
    assert!(sql.contains("(excl.relation IN ('blocked'))"));
    assert!(sql.contains("(excl.object_id = t.object_id)"));
    assert!(sql.contains("((excl.subject_id = p_subject_id) OR (excl.subject_id = '*'))"));
}

#[test]
fn cte_exclusion_replaces_per_row_predicates() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "group",
                vec![relation_def("member", direct(vec![subject_ref("user")]))],
            ),
            type_def(
                "doc",
                vec![
                    relation_def("blocked", direct(vec![subject_ref("user")])),
                    relation_def(
                        "viewer",
                        but_not(
                            direct(vec![subject_ref("user"), userset_ref("group", "member")]),
                            implied("blocked"),
                        ),
                    ),
                ],
            ),
        ],
        "doc",
        "viewer",
        ListDirection::Subjects,
    );
    assert!(sql.contains("excluded_subjects AS ("));
    assert!(sql.contains("LEFT JOIN excluded_subjects AS es"));
    assert!(sql.contains("(es.subject_id IS NULL)"));
    // Per-row anti-predicates are gone from the base blocks.
    assert!(!sql.contains("NOT EXISTS"));
}

#[test]
fn wildcard_tail_guards_subject_listing() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "group",
                vec![relation_def("member", direct(vec![subject_ref("user")]))],
            ),
            type_def(
                "doc",
                vec![relation_def(
                    "viewer",
                    direct(vec![wildcard_ref("user"), userset_ref("group", "member")]),
                )],
            ),
        ],
        "doc",
        "viewer",
        ListDirection::Subjects,
    );
    assert!(sql.contains("base_results AS ("));
    assert!(sql.contains("has_wildcard AS ("));
    assert!(sql.contains("CROSS JOIN has_wildcard AS hw"));
    assert!(sql.contains("check_permission_no_wildcard(p_subject_type, br.subject_id, 'viewer', 'doc', p_object_id)"));
    // Wildcard-first ordering in the pagination.
    assert!(sql.contains("(results.id = '*') DESC"));
}

#[test]
fn intersection_objects_intersect_parts() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "doc",
                vec![
                    relation_def("approved", direct(vec![subject_ref("user")])),
                    relation_def(
                        "viewer",
                        intersection(vec![direct(vec![subject_ref("user")]), implied("approved")]),
                    ),
                ],
            ),
        ],
        "doc",
        "viewer",
        ListDirection::Objects,
    );
    assert!(sql.contains("\nINTERSECT\n"));
    assert!(sql.contains("(t.relation IN ('viewer'))"));
    assert!(sql.contains("(t.relation IN ('approved'))"));
}

#[test]
fn intersection_subjects_filter_candidates() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "doc",
                vec![
                    relation_def("approved", direct(vec![subject_ref("user")])),
                    relation_def(
                        "viewer",
                        intersection(vec![direct(vec![subject_ref("user")]), implied("approved")]),
                    ),
                ],
            ),
        ],
        "doc",
        "viewer",
        ListDirection::Subjects,
    );
    assert!(sql.contains("subject_candidates AS ("));
    assert!(sql.contains("filtered_candidates AS ("));
    assert!(sql.contains("check_permission(p_subject_type, c.subject_id, 'viewer', 'doc', p_object_id)"));
}

#[test]
fn self_ref_userset_objects_expand() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "group",
                vec![relation_def(
                    "member",
                    direct(vec![subject_ref("user"), userset_ref("group", "member")]),
                )],
            ),
        ],
        "group",
        "member",
        ListDirection::Objects,
    );
    assert!(sql.contains("WITH RECURSIVE userset_expansion(userset_object_id, depth) AS ("));
    assert!(sql.contains("(ue.depth < 25)"));
    assert!(sql.contains("userset_expansion.userset_object_id AS object_id"));
}

#[test]
fn self_ref_userset_subjects_branch_on_compound_type() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "group",
                vec![relation_def(
                    "member",
                    direct(vec![subject_ref("user"), userset_ref("group", "member")]),
                )],
            ),
        ],
        "group",
        "member",
        ListDirection::Subjects,
    );
    assert!(sql.contains("v_filter_type text;"));
    assert!(sql.contains("v_filter_relation text;"));
    assert!(sql.contains("IF (position('#' in p_subject_type) > 0) THEN"));
    assert!(sql.contains("v_filter_type := split_part(p_subject_type, '#', 1);"));
    assert!(sql.contains("v_filter_relation := split_part(p_subject_type, '#', 2);"));
    assert!(sql.contains("WITH RECURSIVE userset_expansion(userset_object_id, depth) AS ("));
}

#[test]
fn composed_objects_use_anchor_listing() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "folder",
                vec![relation_def("viewer", direct(vec![subject_ref("user")]))],
            ),
            type_def(
                "doc",
                vec![
                    relation_def("parent", direct(vec![subject_ref("folder")])),
                    relation_def("viewer", ttu("parent", "viewer")),
                ],
            ),
        ],
        "doc",
        "viewer",
        ListDirection::Objects,
    );
    assert!(sql.contains("list_folder_viewer_objects(p_subject_type, p_subject_id, NULL, NULL)"));
    assert!(sql.contains("(link.relation IN ('parent'))"));
    assert!(sql.contains("(l.object_id = link.subject_id)"));
}

#[test]
fn composed_subjects_use_lateral_anchor_listing() {
    let sql = list_sql(
        vec![
            user_type(),
            type_def(
                "folder",
                vec![relation_def("viewer", direct(vec![subject_ref("user")]))],
            ),
            type_def(
                "doc",
                vec![
                    relation_def("parent", direct(vec![subject_ref("folder")])),
                    relation_def("viewer", ttu("parent", "viewer")),
                ],
            ),
        ],
        "doc",
        "viewer",
        ListDirection::Subjects,
    );
    assert!(sql.contains("CROSS JOIN LATERAL list_folder_viewer_subjects(link.subject_id, p_subject_type, NULL, NULL) AS l"));
}

#[test]
fn depth_exceeded_emits_stub() {
    let mut types = vec![user_type()];
    for i in 0..=26 {
        let rewrite = if i == 26 {
            direct(vec![subject_ref("user")])
        } else {
            direct(vec![
                subject_ref("user"),
                userset_ref(&format!("t{}", i + 1), "member"),
            ])
        };
        types.push(type_def(&format!("t{}", i), vec![relation_def("member", rewrite)]));
    }
    let sql = list_sql(types, "t0", "member", ListDirection::Objects);
    assert!(sql.contains("RAISE EXCEPTION 'resolution too complex' USING ERRCODE = 'M2002';"));
    // The stub carries no query machinery.
    assert!(!sql.contains("RETURN QUERY"));
}

#[test]
fn grantless_relation_is_rejected() {
    let err = try_list_sql(
        vec![
            user_type(),
            type_def(
                "doc",
                vec![
                    relation_def("ghost", direct(vec![])),
                    relation_def("viewer", implied("ghost")),
                ],
            ),
        ],
        "doc",
        "viewer",
        ListDirection::Objects,
    )
    .unwrap_err();
    assert!(matches!(err, ListGeneratorError::ListNotAllowed { .. }));
}

#[test]
fn list_sql_is_deterministic() {
    let types = || {
        vec![
            user_type(),
            type_def(
                "group",
                vec![relation_def("member", direct(vec![subject_ref("user")]))],
            ),
            type_def(
                "doc",
                vec![
                    relation_def("editor", direct(vec![subject_ref("user")])),
                    relation_def(
                        "viewer",
                        union(vec![
                            direct(vec![subject_ref("user"), userset_ref("group", "member")]),
                            implied("editor"),
                        ]),
                    ),
                ],
            ),
        ]
    };
    let first = list_sql(types(), "doc", "viewer", ListDirection::Objects);
    for _ in 0..5 {
        assert_eq!(list_sql(types(), "doc", "viewer", ListDirection::Objects), first);
    }
}
