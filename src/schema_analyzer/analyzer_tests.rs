use crate::schema_catalog::schema_types::test_support::*;
use crate::schema_catalog::{schema_validator, RelationDefinition, SchemaCatalog, TypeDefinition};

use super::analysis::{AnchorStepKind, ExclusionBranch, IntersectionPartKind, ListStrategy};
use super::{analyze, AnalysisSet};

fn analyzed(types: Vec<TypeDefinition>) -> AnalysisSet {
    let catalog = SchemaCatalog::build(document(types)).unwrap();
    schema_validator::validate(&catalog).unwrap();
    analyze(&catalog).unwrap()
}

fn user_type() -> TypeDefinition {
    type_def("user", vec![])
}

#[test]
fn plain_direct_relation() {
    let set = analyzed(vec![
        user_type(),
        type_def("doc", vec![relation_def("viewer", direct(vec![subject_ref("user")]))]),
    ]);
    let viewer = set.get("doc", "viewer").unwrap();
    assert!(viewer.has_direct);
    assert!(!viewer.has_implied);
    assert!(!viewer.has_userset && !viewer.has_ttu && !viewer.has_exclusion);
    assert_eq!(viewer.direct_lookup_relations(), vec!["viewer".to_string()]);
    assert_eq!(viewer.allowed_subject_types, vec!["user".to_string()]);
    assert_eq!(viewer.list_strategy, ListStrategy::Direct);
    assert!(viewer.capabilities.check_allowed);
    assert!(viewer.capabilities.list_allowed);
}

#[test]
fn implication_expands_closure() {
    let set = analyzed(vec![
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
    ]);
    let viewer = set.get("doc", "viewer").unwrap();
    assert_eq!(
        viewer.direct_lookup_relations(),
        vec!["editor".to_string(), "viewer".to_string()]
    );
    assert_eq!(viewer.simple_closure_relations, vec!["editor".to_string()]);
    assert!(viewer.complex_closure_relations.is_empty());
    assert_eq!(viewer.list_strategy, ListStrategy::Direct);
}

#[test]
fn implication_cycle_terminates() {
    let set = analyzed(vec![
        user_type(),
        type_def(
            "doc",
            vec![
                relation_def("a", union(vec![direct(vec![subject_ref("user")]), implied("b")])),
                relation_def("b", implied("a")),
            ],
        ),
    ]);
    let a = set.get("doc", "a").unwrap();
    assert_eq!(
        a.direct_lookup_relations(),
        vec!["a".to_string(), "b".to_string()]
    );
    let b = set.get("doc", "b").unwrap();
    assert_eq!(
        b.direct_lookup_relations(),
        vec!["a".to_string(), "b".to_string()]
    );
}

#[test]
fn userset_pattern_inherits_target_closure() {
    let set = analyzed(vec![
        user_type(),
        type_def(
            "group",
            vec![
                relation_def("admin", direct(vec![subject_ref("user")])),
                relation_def(
                    "member",
                    union(vec![direct(vec![subject_ref("user")]), implied("admin")]),
                ),
            ],
        ),
        type_def(
            "doc",
            vec![relation_def("viewer", direct(vec![userset_ref("group", "member")]))],
        ),
    ]);
    let viewer = set.get("doc", "viewer").unwrap();
    assert!(viewer.has_userset);
    assert_eq!(viewer.list_strategy, ListStrategy::Userset);
    assert_eq!(viewer.userset_patterns.len(), 1);
    let pattern = &viewer.userset_patterns[0];
    assert_eq!(pattern.subject_type, "group");
    assert_eq!(pattern.subject_relation, "member");
    assert_eq!(
        pattern.satisfying_relations,
        vec!["admin".to_string(), "member".to_string()]
    );
    assert!(!pattern.is_complex);
    // The userset ref is a direct grant but contributes no plain type.
    assert!(viewer.allowed_subject_types.is_empty());
    assert!(viewer.closure_has_direct);
    assert!(viewer.capabilities.list_allowed);
}

#[test]
fn self_referential_ttu_is_recursive() {
    let set = analyzed(vec![
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
    ]);
    let viewer = set.get("folder", "viewer").unwrap();
    assert!(viewer.has_ttu);
    assert!(viewer.has_recursive);
    assert_eq!(viewer.parent_relations.len(), 1);
    let parent = &viewer.parent_relations[0];
    assert_eq!(parent.linking_relation, "parent");
    assert_eq!(parent.target_relation, "viewer");
    assert_eq!(parent.target_types, vec!["folder".to_string()]);
    assert!(parent.has_self_referential_link);
    assert!(!parent.has_cross_type_link);
    assert_eq!(viewer.list_strategy, ListStrategy::Recursive);
}

#[test]
fn cross_type_ttu_keeps_userset_or_direct_strategy() {
    let set = analyzed(vec![
        user_type(),
        type_def("org", vec![relation_def("admin", direct(vec![subject_ref("user")]))]),
        type_def(
            "doc",
            vec![
                relation_def("owner", direct(vec![subject_ref("org")])),
                relation_def(
                    "viewer",
                    union(vec![direct(vec![subject_ref("user")]), ttu("owner", "admin")]),
                ),
            ],
        ),
    ]);
    let viewer = set.get("doc", "viewer").unwrap();
    assert!(viewer.has_ttu);
    assert!(!viewer.has_recursive);
    let parent = &viewer.parent_relations[0];
    assert!(parent.has_cross_type_link);
    assert!(!parent.has_self_referential_link);
    assert_eq!(viewer.list_strategy, ListStrategy::Direct);
}

#[test]
fn simple_exclusion_classification() {
    let set = analyzed(vec![
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
    ]);
    let viewer = set.get("doc", "viewer").unwrap();
    assert!(viewer.has_exclusion);
    assert_eq!(viewer.exclusions.branches.len(), 1);
    match &viewer.exclusions.branches[0] {
        ExclusionBranch::Simple {
            relations,
            has_wildcard,
        } => {
            assert_eq!(relations, &vec!["blocked".to_string()]);
            assert!(!has_wildcard);
        }
        other => panic!("expected simple exclusion, got {:?}", other),
    }
    assert!(viewer.exclusions.all_simple());
    // Exclusion alone does not change the list strategy.
    assert_eq!(viewer.list_strategy, ListStrategy::Direct);
}

#[test]
fn complex_exclusion_classification() {
    let set = analyzed(vec![
        user_type(),
        type_def(
            "group",
            vec![relation_def("member", direct(vec![subject_ref("user")]))],
        ),
        type_def(
            "doc",
            vec![
                relation_def("banned", direct(vec![userset_ref("group", "member")])),
                relation_def(
                    "viewer",
                    but_not(direct(vec![subject_ref("user")]), implied("banned")),
                ),
            ],
        ),
    ]);
    let viewer = set.get("doc", "viewer").unwrap();
    match &viewer.exclusions.branches[0] {
        ExclusionBranch::Complex { relation } => assert_eq!(relation, "banned"),
        other => panic!("expected complex exclusion, got {:?}", other),
    }
    assert!(!viewer.exclusions.all_simple());
}

#[test]
fn intersection_groups_and_strategy() {
    let set = analyzed(vec![
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
    ]);
    let viewer = set.get("doc", "viewer").unwrap();
    assert!(viewer.has_intersection);
    assert_eq!(viewer.list_strategy, ListStrategy::Intersection);
    assert_eq!(viewer.intersection_groups.len(), 1);
    let group = &viewer.intersection_groups[0];
    assert_eq!(group.parts.len(), 2);
    match &group.parts[0].kind {
        IntersectionPartKind::Direct {
            relations,
            subject_types,
            has_wildcard,
        } => {
            assert_eq!(relations, &vec!["viewer".to_string()]);
            assert_eq!(subject_types, &vec!["user".to_string()]);
            assert!(!has_wildcard);
        }
        other => panic!("expected direct part, got {:?}", other),
    }
    match &group.parts[1].kind {
        IntersectionPartKind::ComputedUserset {
            relation,
            satisfying_relations,
            is_complex,
            ..
        } => {
            assert_eq!(relation, "approved");
            assert_eq!(satisfying_relations, &vec!["approved".to_string()]);
            assert!(!is_complex);
        }
        other => panic!("expected computed-userset part, got {:?}", other),
    }
}

#[test]
fn intersection_member_lands_in_its_own_closure_list() {
    let set = analyzed(vec![
        user_type(),
        type_def(
            "doc",
            vec![
                relation_def("approved", direct(vec![subject_ref("user")])),
                relation_def(
                    "gated",
                    intersection(vec![direct(vec![subject_ref("user")]), implied("approved")]),
                ),
                relation_def("viewer", implied("gated")),
            ],
        ),
    ]);
    let viewer = set.get("doc", "viewer").unwrap();
    assert_eq!(
        viewer.intersection_closure_relations,
        vec!["gated".to_string()]
    );
    assert!(viewer.simple_closure_relations.is_empty());
    assert!(viewer.complex_closure_relations.is_empty());
    // Only the relation's own rewrite flips the Intersection strategy.
    assert_ne!(viewer.list_strategy, ListStrategy::Intersection);
}

#[test]
fn composed_strategy_uses_anchor() {
    let set = analyzed(vec![
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
    ]);
    let viewer = set.get("doc", "viewer").unwrap();
    assert!(!viewer.has_direct && !viewer.has_implied);
    assert_eq!(viewer.list_strategy, ListStrategy::Composed);
    assert_eq!(viewer.indirect_anchor.len(), 1);
    let step = &viewer.indirect_anchor[0];
    assert_eq!(step.kind, AnchorStepKind::Ttu);
    assert_eq!(step.via_relation, "parent");
    assert_eq!(step.target_relation, "viewer");
    assert_eq!(step.target_types, vec!["folder".to_string()]);
    assert!(viewer.capabilities.list_allowed);
}

#[test]
fn grantless_relation_disallows_listing() {
    let set = analyzed(vec![
        user_type(),
        type_def(
            "doc",
            vec![
                relation_def("ghost", direct(vec![])),
                relation_def("viewer", implied("ghost")),
            ],
        ),
    ]);
    let viewer = set.get("doc", "viewer").unwrap();
    assert!(!viewer.closure_has_direct);
    assert!(viewer.indirect_anchor.is_empty());
    assert!(viewer.capabilities.check_allowed);
    assert!(!viewer.capabilities.list_allowed);
}

#[test]
fn self_referential_userset_strategy() {
    let set = analyzed(vec![
        user_type(),
        type_def(
            "group",
            vec![relation_def(
                "member",
                direct(vec![subject_ref("user"), userset_ref("group", "member")]),
            )],
        ),
    ]);
    let member = set.get("group", "member").unwrap();
    assert_eq!(member.list_strategy, ListStrategy::SelfRefUserset);
    // The self-loop contributes no chain depth.
    assert_eq!(member.max_userset_depth, 0);
}

#[test]
fn wildcard_propagates_through_closure() {
    let set = analyzed(vec![
        user_type(),
        type_def(
            "doc",
            vec![
                relation_def("anyone", direct(vec![wildcard_ref("user")])),
                relation_def("viewer", implied("anyone")),
            ],
        ),
    ]);
    let viewer = set.get("doc", "viewer").unwrap();
    assert!(viewer.has_wildcard);
    assert_eq!(viewer.allowed_subject_types, vec!["user".to_string()]);
}

fn userset_chain(length: usize) -> Vec<TypeDefinition> {
    let mut types = vec![user_type()];
    for i in 0..=length {
        let rewrite = if i == length {
            direct(vec![subject_ref("user")])
        } else {
            direct(vec![
                subject_ref("user"),
                userset_ref(&format!("t{}", i + 1), "member"),
            ])
        };
        types.push(type_def(&format!("t{}", i), vec![relation_def("member", rewrite)]));
    }
    types
}

#[test]
fn userset_chain_at_cap_keeps_userset_strategy() {
    let set = analyzed(userset_chain(25));
    let head = set.get("t0", "member").unwrap();
    assert_eq!(head.max_userset_depth, 25);
    assert_eq!(head.list_strategy, ListStrategy::Userset);
}

#[test]
fn userset_chain_over_cap_is_depth_exceeded() {
    let set = analyzed(userset_chain(26));
    let head = set.get("t0", "member").unwrap();
    assert_eq!(head.max_userset_depth, 26);
    assert_eq!(head.list_strategy, ListStrategy::DepthExceeded);
}

#[test]
fn analysis_is_deterministic() {
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
    let first = analyzed(types.clone());
    for _ in 0..5 {
        let again = analyzed(types.clone());
        assert_eq!(first.analyses(), again.analyses());
    }
}
