//! Use case layer: application workflows and orchestration.

pub mod bootstrap;
pub mod chat_service;
pub mod context;
pub mod open_stream;
pub mod send_message;

/// Returns the usecases module name for smoke checks.
pub fn module_name() -> &'static str {
    "usecases"
}
