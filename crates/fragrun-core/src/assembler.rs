//! Builds one runnable program out of the registered fragments.

use crate::errors::ExecutionError;
use crate::registry::Fragment;

/// Name of the fragment that must be present for a program to run.
pub const ENTRY_FRAGMENT: &str = "main";

/// Joins every fragment's code with a newline, in the order given.
///
/// Fails with `NotFound` when `fragments` is empty or holds no fragment named
/// `main`. The result is not checked for syntax; problems surface when the
/// program executes.
pub fn assemble(fragments: &[Fragment]) -> Result<String, ExecutionError> {
    if fragments.is_empty() {
        return Err(ExecutionError::no_functions());
    }
    if !fragments.iter().any(|f| f.name == ENTRY_FRAGMENT) {
        return Err(ExecutionError::main_not_found());
    }

    Ok(fragments
        .iter()
        .map(|f| f.code.as_str())
        .collect::<Vec<_>>()
        .join("\n"))
}
