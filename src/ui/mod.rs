//! UI layer: terminal output for the CLI commands.

pub mod history;

/// Returns the UI module name for smoke checks.
pub fn module_name() -> &'static str {
    "ui"
}
