//! Domain layer: core entities and business rules.

pub mod message;
pub mod read_state;
pub mod summary;

/// Returns the domain module name for smoke checks.
pub fn module_name() -> &'static str {
    "domain"
}
