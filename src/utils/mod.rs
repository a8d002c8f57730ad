pub mod sql_naming;

pub use sql_naming::{
    check_function_name, is_valid_emitted_identifier, list_objects_function_name,
    list_subjects_function_name, sanitize_identifier, CHECK_DISPATCHER,
    CHECK_DISPATCHER_INTERNAL, CHECK_DISPATCHER_NO_WILDCARD,
    CHECK_DISPATCHER_NO_WILDCARD_INTERNAL, LIST_OBJECTS_DISPATCHER, LIST_SUBJECTS_DISPATCHER,
    NO_WILDCARD_SUFFIX,
};
