use serde::{Deserialize, Serialize};

/// Compiler options.
///
/// Defaults compile everything: both wildcard variants and best-effort
/// list emission (relations without a reachable grant path are skipped
/// with a warning instead of failing the run).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOptions {
    /// Fail compilation when a relation's list functions cannot be
    /// emitted, instead of skipping them.
    pub strict: bool,
    /// Emit the `_no_wildcard` check variants and their dispatchers.
    pub emit_no_wildcard: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            strict: false,
            emit_no_wildcard: true,
        }
    }
}

impl CompilerOptions {
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn emit_no_wildcard(mut self, emit: bool) -> Self {
        self.emit_no_wildcard = emit;
        self
    }
}
