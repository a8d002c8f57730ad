//! Centralized naming for emitted SQL functions.
//!
//! All function-name generation MUST go through these helpers so that the
//! generator, the dispatchers, and `collect_function_names` agree on the
//! exact spelling. Names derived from schema identifiers are sanitised
//! here and nowhere else.
//!
//! ## Naming Convention
//! - `check_{type}_{relation}` / `check_{type}_{relation}_no_wildcard`
//! - `list_{type}_{relation}_objects` / `list_{type}_{relation}_subjects`

use lazy_static::lazy_static;
use regex::Regex;

/// Suffix appended to check functions that ignore wildcard grants.
pub const NO_WILDCARD_SUFFIX: &str = "_no_wildcard";

/// Dispatcher entry point starting a fresh resolution.
pub const CHECK_DISPATCHER: &str = "check_permission";
/// Dispatcher threading the visited accumulator.
pub const CHECK_DISPATCHER_INTERNAL: &str = "check_permission_internal";
pub const CHECK_DISPATCHER_NO_WILDCARD: &str = "check_permission_no_wildcard";
pub const CHECK_DISPATCHER_NO_WILDCARD_INTERNAL: &str = "check_permission_no_wildcard_internal";
pub const LIST_OBJECTS_DISPATCHER: &str = "list_accessible_objects";
pub const LIST_SUBJECTS_DISPATCHER: &str = "list_accessible_subjects";

lazy_static! {
    static ref EMITTED_IDENT_RE: Regex = Regex::new("^[A-Za-z0-9_]+$").expect("valid literal regex");
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
///
/// Applied to each schema identifier before it is embedded in an emitted
/// function name. Quoting is NOT an alternative here: the names appear in
/// `CREATE FUNCTION` statements, dispatch `CASE` arms, and migration
/// catalogues, and must stay plain identifiers.
///
/// # Examples
/// ```
/// use melange::utils::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("doc"), "doc");
/// assert_eq!(sanitize_identifier("my-type"), "my_type");
/// assert_eq!(sanitize_identifier("a'b;c"), "a_b_c");
/// ```
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Check a fully assembled emitted name against `^[A-Za-z0-9_]+$`.
///
/// Used by tests and by the generator's final assertion pass.
pub fn is_valid_emitted_identifier(name: &str) -> bool {
    EMITTED_IDENT_RE.is_match(name)
}

/// `check_{type}_{relation}`, with optional `_no_wildcard` suffix.
pub fn check_function_name(object_type: &str, relation: &str, no_wildcard: bool) -> String {
    let base = format!(
        "check_{}_{}",
        sanitize_identifier(object_type),
        sanitize_identifier(relation)
    );
    if no_wildcard {
        format!("{}{}", base, NO_WILDCARD_SUFFIX)
    } else {
        base
    }
}

/// `list_{type}_{relation}_objects`
pub fn list_objects_function_name(object_type: &str, relation: &str) -> String {
    format!(
        "list_{}_{}_objects",
        sanitize_identifier(object_type),
        sanitize_identifier(relation)
    )
}

/// `list_{type}_{relation}_subjects`
pub fn list_subjects_function_name(object_type: &str, relation: &str) -> String {
    format!(
        "list_{}_{}_subjects",
        sanitize_identifier(object_type),
        sanitize_identifier(relation)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_passthrough() {
        assert_eq!(sanitize_identifier("doc_v2"), "doc_v2");
        assert_eq!(sanitize_identifier("ABC123"), "ABC123");
    }

    #[test]
    fn test_sanitize_replaces_specials() {
        assert_eq!(sanitize_identifier("my-type"), "my_type");
        assert_eq!(sanitize_identifier("a b"), "a_b");
        assert_eq!(sanitize_identifier("quote'd"), "quote_d");
        assert_eq!(sanitize_identifier("päx"), "p_x");
    }

    #[test]
    fn test_function_names() {
        assert_eq!(check_function_name("doc", "viewer", false), "check_doc_viewer");
        assert_eq!(
            check_function_name("doc", "viewer", true),
            "check_doc_viewer_no_wildcard"
        );
        assert_eq!(
            list_objects_function_name("doc", "viewer"),
            "list_doc_viewer_objects"
        );
        assert_eq!(
            list_subjects_function_name("doc", "can-read"),
            "list_doc_can_read_subjects"
        );
    }

    #[test]
    fn test_sanitised_names_validate() {
        for raw in ["ok", "with space", "semi;colon", "d'oc"] {
            assert!(is_valid_emitted_identifier(&sanitize_identifier(raw)));
        }
        assert!(!is_valid_emitted_identifier("has space"));
        assert!(!is_valid_emitted_identifier(""));
    }
}
