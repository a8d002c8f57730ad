use crate::inline_data::build_inline_data;
use crate::schema_analyzer::analyze;
use crate::schema_catalog::schema_types::test_support::*;
use crate::schema_catalog::{SchemaCatalog, TypeDefinition};
use crate::sql_ir::ToSql;

use super::plan::{determine_check_function_type, CheckFunctionType, CheckPlan};
use super::build_check_function;

fn check_sql(types: Vec<TypeDefinition>, object_type: &str, relation: &str) -> String {
    check_sql_variant(types, object_type, relation, false)
}

fn check_sql_variant(
    types: Vec<TypeDefinition>,
    object_type: &str,
    relation: &str,
    no_wildcard: bool,
) -> String {
    let catalog = SchemaCatalog::build(document(types)).unwrap();
    let analyses = analyze(&catalog).unwrap();
    let inline = build_inline_data(&analyses);
    let analysis = analyses.get(object_type, relation).unwrap();
    build_check_function(analysis, &inline, no_wildcard)
        .unwrap()
        .to_sql()
}

fn plan_for(types: Vec<TypeDefinition>, object_type: &str, relation: &str) -> CheckPlan {
    let catalog = SchemaCatalog::build(document(types)).unwrap();
    let analyses = analyze(&catalog).unwrap();
    CheckPlan::build(analyses.get(object_type, relation).unwrap(), false)
}

fn user_type() -> TypeDefinition {
    type_def("user", vec![])
}

#[test]
fn plain_direct_check() {
    let sql = check_sql(
        vec![
            user_type(),
            type_def("doc", vec![relation_def("viewer", direct(vec![subject_ref("user")]))]),
        ],
        "doc",
        "viewer",
    );
    assert!(sql.contains("CREATE OR REPLACE FUNCTION check_doc_viewer(p_subject_type text, p_subject_id text, p_object_id text, p_visited text[] DEFAULT ARRAY[]::text[])"));
    assert!(sql.contains("RETURNS integer AS $$"));
    assert!(sql.contains("(t.object_type = 'doc')"));
    assert!(sql.contains("(t.relation IN ('viewer'))"));
    assert!(sql.contains("(t.object_id = p_object_id)"));
    assert!(sql.contains("(t.subject_type = p_subject_type)"));
    assert!(sql.contains("(t.subject_id = p_subject_id)"));
    // No wildcard grants in the schema, so no wildcard match.
    assert!(!sql.contains("(t.subject_id = '*')"));
    assert!(sql.contains("RETURN 1;"));
    assert!(sql.ends_with("$$ LANGUAGE plpgsql STABLE;\n"));
    // Pure boolean composition: no cycle-detection key.
    assert!(!sql.contains("v_key"));
}

#[test]
fn implication_widens_direct_lookup() {
    let sql = check_sql(
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
    );
    assert!(sql.contains("(t.relation IN ('editor', 'viewer'))"));
}

#[test]
fn wildcard_schema_adds_wildcard_match() {
    let types = vec![
        user_type(),
        type_def("doc", vec![relation_def("viewer", direct(vec![wildcard_ref("user")]))]),
    ];
    let sql = check_sql(types.clone(), "doc", "viewer");
    assert!(sql.contains("((t.subject_id = p_subject_id) OR (t.subject_id = '*'))"));

    let no_wildcard_sql = check_sql_variant(types, "doc", "viewer", true);
    assert!(no_wildcard_sql.contains("check_doc_viewer_no_wildcard"));
    assert!(!no_wildcard_sql.contains("(t.subject_id = '*')"));
}

#[test]
fn simple_userset_join_form() {
    let sql = check_sql(
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
    );
    assert!(sql.contains("JOIN melange_tuples AS membership"));
    assert!(sql.contains("(membership.object_type = 'group')"));
    assert!(sql.contains("(membership.object_id = split_part(granted.subject_id, '#', 1))"));
    assert!(sql.contains("(membership.relation IN ('member'))"));
    assert!(sql.contains("(membership.subject_type = p_subject_type)"));
    assert!(sql.contains("(position('#' in granted.subject_id) > 0)"));
    assert!(sql.contains("(split_part(granted.subject_id, '#', 2) = 'member')"));
    // Membership is a plain lookup, not a recursive call.
    assert!(!sql.contains("check_permission_internal"));
}

#[test]
fn complex_userset_uses_recursive_call() {
    let sql = check_sql(
        vec![
            user_type(),
            type_def(
                "team",
                vec![relation_def("lead", direct(vec![subject_ref("user")]))],
            ),
            type_def(
                "group",
                vec![relation_def(
                    "member",
                    direct(vec![subject_ref("user"), userset_ref("team", "lead")]),
                )],
            ),
            type_def(
                "doc",
                vec![relation_def("viewer", direct(vec![userset_ref("group", "member")]))],
            ),
        ],
        "doc",
        "viewer",
    );
    assert!(sql.contains("check_permission_internal(p_subject_type, p_subject_id, split_part(granted.subject_id, '#', 2), 'group', split_part(granted.subject_id, '#', 1), (p_visited || v_key))"));
    assert!(sql.contains("v_key text := ('doc:' || p_object_id || ':viewer');"));
    assert!(sql.contains("IF (v_key = ANY(p_visited)) THEN"));
    assert!(sql.contains("IF (array_length(p_visited, 1) >= 25) THEN"));
    assert!(sql.contains("RAISE EXCEPTION 'resolution too complex' USING ERRCODE = 'M2002';"));
}

#[test]
fn exclusion_wraps_grant() {
    let sql = check_sql(
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
    );
    assert!(sql.contains("(excl.relation IN ('blocked'))"));
    assert!(sql.contains("(excl.object_id = p_object_id)"));
    // Exclusion matches wildcard bans regardless of grant-side wildcards.
    assert!(sql.contains("((excl.subject_id = p_subject_id) OR (excl.subject_id = '*'))"));
    // Exclusion present: grant returns 0, otherwise 1.
    assert!(sql.contains("RETURN 0;"));
    assert!(sql.contains("ELSE"));
}

#[test]
fn ttu_emits_link_check() {
    let sql = check_sql(
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
    );
    assert!(sql.contains("(link.relation IN ('parent'))"));
    assert!(sql.contains("(link.subject_type IN ('folder'))"));
    assert!(sql.contains(
        "check_permission_internal(p_subject_type, p_subject_id, 'viewer', link.subject_type, link.subject_id, (p_visited || v_key))"
    ));
}

#[test]
fn userset_subject_prelude_present() {
    let sql = check_sql(
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
    );
    assert!(sql.contains("IF (position('#' in p_subject_id) > 0) THEN"));
    assert!(sql.contains("(p_subject_type = 'doc')"));
    assert!(sql.contains("(split_part(p_subject_id, '#', 1) = p_object_id)"));
    assert!(sql.contains("AS closure(satisfying_relation)"));
    assert!(sql.contains("AS pat(subject_type, subject_relation, satisfying_relation)"));
}

#[test]
fn function_type_selection() {
    let direct_plan = plan_for(
        vec![
            user_type(),
            type_def("doc", vec![relation_def("viewer", direct(vec![subject_ref("user")]))]),
        ],
        "doc",
        "viewer",
    );
    assert_eq!(
        determine_check_function_type(&direct_plan),
        CheckFunctionType::Direct
    );

    let intersection_plan = plan_for(
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
    );
    assert_eq!(
        determine_check_function_type(&intersection_plan),
        CheckFunctionType::Intersection
    );

    let recursive_plan = plan_for(
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
    );
    assert_eq!(
        determine_check_function_type(&recursive_plan),
        CheckFunctionType::Recursive
    );
}

#[test]
fn intersection_body_stages_access_flag() {
    let sql = check_sql(
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
    );
    assert!(sql.contains("v_has_access boolean := FALSE;"));
    assert!(sql.contains("IF (NOT v_has_access) THEN"));
    assert!(sql.contains("v_has_access := TRUE;"));
    assert!(sql.contains("IF v_has_access THEN"));
    // Both parts of the group appear as conjuncts.
    assert!(sql.contains("(t.relation IN ('viewer'))"));
    assert!(sql.contains("(t.relation IN ('approved'))"));
}

#[test]
fn generated_sql_is_deterministic() {
    let types = vec![
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
    ];
    let first = check_sql(types.clone(), "doc", "viewer");
    for _ in 0..5 {
        assert_eq!(check_sql(types.clone(), "doc", "viewer"), first);
    }
}
