//! The complete catalogue of names `generate` emits, for migration
//! layers that drop orphaned functions.

use crate::schema_analyzer::AnalysisSet;
use crate::utils::{
    check_function_name, list_objects_function_name, list_subjects_function_name,
    CHECK_DISPATCHER, CHECK_DISPATCHER_INTERNAL, CHECK_DISPATCHER_NO_WILDCARD,
    CHECK_DISPATCHER_NO_WILDCARD_INTERNAL, LIST_OBJECTS_DISPATCHER, LIST_SUBJECTS_DISPATCHER,
};

/// Every function name `generate` will emit for these analyses, in
/// emission order: specialised functions by `(object_type, relation)`,
/// then the dispatchers.
pub fn collect_function_names(analyses: &AnalysisSet) -> Vec<String> {
    let mut keys: Vec<(&str, &str, bool)> = analyses
        .iter()
        .map(|a| {
            (
                a.object_type.as_str(),
                a.relation.as_str(),
                a.capabilities.list_allowed,
            )
        })
        .collect();
    keys.sort();

    let mut names = Vec::new();
    for (object_type, relation, list_allowed) in keys {
        names.push(check_function_name(object_type, relation, false));
        names.push(check_function_name(object_type, relation, true));
        if list_allowed {
            names.push(list_objects_function_name(object_type, relation));
            names.push(list_subjects_function_name(object_type, relation));
        }
    }
    names.extend(
        [
            CHECK_DISPATCHER,
            CHECK_DISPATCHER_INTERNAL,
            CHECK_DISPATCHER_NO_WILDCARD,
            CHECK_DISPATCHER_NO_WILDCARD_INTERNAL,
            LIST_OBJECTS_DISPATCHER,
            LIST_SUBJECTS_DISPATCHER,
        ]
        .map(String::from),
    );
    names
}
