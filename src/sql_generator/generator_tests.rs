use crate::config::CompilerOptions;
use crate::inline_data::build_inline_data;
use crate::schema_analyzer::analyze;
use crate::schema_catalog::schema_types::test_support::*;
use crate::schema_catalog::{SchemaCatalog, TypeDefinition};

use super::{collect_function_names, generate, generate_with_options, SqlGeneratorError};

fn generated(types: Vec<TypeDefinition>) -> super::GeneratedSql {
    generated_with(types, &CompilerOptions::default()).unwrap()
}

fn generated_with(
    types: Vec<TypeDefinition>,
    options: &CompilerOptions,
) -> Result<super::GeneratedSql, SqlGeneratorError> {
    let catalog = SchemaCatalog::build(document(types)).unwrap();
    let analyses = analyze(&catalog).unwrap();
    let inline = build_inline_data(&analyses);
    generate_with_options(&analyses, &inline, options)
}

fn user_type() -> TypeDefinition {
    type_def("user", vec![])
}

fn sample_types() -> Vec<TypeDefinition> {
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
}

#[test]
fn generates_all_catalogues() {
    let generated = generated(sample_types());
    // Three relations: group.member, doc.editor, doc.viewer.
    assert_eq!(generated.check_functions.len(), 3);
    assert_eq!(generated.no_wildcard_check_functions.len(), 3);
    assert_eq!(generated.list_object_functions.len(), 3);
    assert_eq!(generated.list_subject_functions.len(), 3);
    assert_eq!(generated.summary.relation_count, 3);
    assert_eq!(generated.summary.check_function_count, 6);
    assert_eq!(generated.summary.list_function_count, 6);
    assert!(generated.summary.skipped_list_relations.is_empty());
}

#[test]
fn catalogues_are_ordered_by_type_then_relation() {
    let generated = generated(sample_types());
    // doc.editor < doc.viewer < group.member lexicographically.
    assert!(generated.check_functions[0].contains("check_doc_editor("));
    assert!(generated.check_functions[1].contains("check_doc_viewer("));
    assert!(generated.check_functions[2].contains("check_group_member("));
}

#[test]
fn dispatcher_has_one_branch_per_relation() {
    let generated = generated(sample_types());
    let dispatcher = &generated.check_dispatcher;
    for (object_type, relation) in [("doc", "editor"), ("doc", "viewer"), ("group", "member")] {
        let condition = format!(
            "WHEN ((p_object_type = '{}') AND (p_relation = '{}'))",
            object_type, relation
        );
        assert_eq!(
            dispatcher.matches(&condition).count(),
            1,
            "expected exactly one branch for {}.{}",
            object_type,
            relation
        );
        assert!(dispatcher.contains(&format!("check_{}_{}(", object_type, relation)));
    }
    assert!(dispatcher.contains("ELSE 0"));
    // The shim starts the chain with an empty array.
    assert!(dispatcher.contains(
        "check_permission_internal(p_subject_type, p_subject_id, p_relation, p_object_type, p_object_id, ARRAY[]::text[])"
    ));
}

#[test]
fn dispatcher_guards_depth() {
    let generated = generated(sample_types());
    assert!(generated
        .check_dispatcher
        .contains("IF (array_length(p_visited, 1) >= 25) THEN"));
    assert!(generated
        .check_dispatcher
        .contains("RAISE EXCEPTION 'resolution too complex' USING ERRCODE = 'M2002';"));
}

#[test]
fn list_dispatchers_route_and_deny_by_default() {
    let generated = generated(sample_types());
    assert!(generated
        .list_objects_dispatcher
        .contains("FROM list_doc_viewer_objects(p_subject_type, p_subject_id, p_limit, p_after) AS l;"));
    assert!(generated
        .list_subjects_dispatcher
        .contains("FROM list_doc_viewer_subjects(p_object_id, p_subject_type, p_limit, p_after) AS l;"));
    // Fallthrough returns an empty set rather than raising.
    assert!(generated.list_objects_dispatcher.trim_end().ends_with("RETURN;\nEND;\n$$ LANGUAGE plpgsql STABLE ROWS 100;"));
}

#[test]
fn no_wildcard_emission_can_be_disabled() {
    let generated = generated_with(
        sample_types(),
        &CompilerOptions::default().emit_no_wildcard(false),
    )
    .unwrap();
    assert!(generated.no_wildcard_check_functions.is_empty());
    assert!(generated.no_wildcard_check_dispatcher.is_empty());
    assert!(!generated.check_functions.is_empty());
}

fn grantless_types() -> Vec<TypeDefinition> {
    vec![
        user_type(),
        type_def(
            "doc",
            vec![
                relation_def("ghost", direct(vec![])),
                relation_def("viewer", implied("ghost")),
            ],
        ),
    ]
}

#[test]
fn unlistable_relations_are_skipped_by_default() {
    let generated = generated(grantless_types());
    assert_eq!(generated.check_functions.len(), 2);
    assert!(generated.list_object_functions.is_empty());
    assert_eq!(generated.summary.skipped_list_relations.len(), 4);
}

#[test]
fn strict_mode_rejects_unlistable_relations() {
    let err = generated_with(grantless_types(), &CompilerOptions::default().strict(true))
        .unwrap_err();
    assert!(matches!(
        err,
        SqlGeneratorError::UnsupportedCombination { ref object_type, .. } if object_type == "doc"
    ));
}

#[test]
fn schema_identifiers_are_sanitised_in_names_and_escaped_in_literals() {
    let generated = generated(vec![
        user_type(),
        type_def(
            "my-doc's",
            vec![relation_def("can-read", direct(vec![subject_ref("user")]))],
        ),
    ]);
    let check = &generated.check_functions[0];
    // Function names stay plain identifiers.
    assert!(check.contains("CREATE OR REPLACE FUNCTION check_my_doc_s_can_read("));
    // Literals keep the raw name with the quote doubled.
    assert!(check.contains("(t.object_type = 'my-doc''s')"));
    assert!(check.contains("(t.relation IN ('can-read'))"));
}

#[test]
fn function_name_catalogue_matches_emission() {
    let catalog = SchemaCatalog::build(document(sample_types())).unwrap();
    let analyses = analyze(&catalog).unwrap();
    let names = collect_function_names(&analyses);
    assert_eq!(
        names,
        vec![
            "check_doc_editor",
            "check_doc_editor_no_wildcard",
            "list_doc_editor_objects",
            "list_doc_editor_subjects",
            "check_doc_viewer",
            "check_doc_viewer_no_wildcard",
            "list_doc_viewer_objects",
            "list_doc_viewer_subjects",
            "check_group_member",
            "check_group_member_no_wildcard",
            "list_group_member_objects",
            "list_group_member_subjects",
            "check_permission",
            "check_permission_internal",
            "check_permission_no_wildcard",
            "check_permission_no_wildcard_internal",
            "list_accessible_objects",
            "list_accessible_subjects",
        ]
    );
}

#[test]
fn generation_is_byte_stable() {
    let first = generated(sample_types());
    for _ in 0..5 {
        let again = generated(sample_types());
        assert_eq!(first.to_script(), again.to_script());
        assert_eq!(first, again);
    }
}

#[test]
fn script_carries_section_banners() {
    let script = generated(sample_types()).to_script();
    assert!(script.contains("-- ==== check functions ===="));
    assert!(script.contains("-- ==== list subjects functions ===="));
    assert!(script.contains("-- ==== dispatchers ===="));
}
