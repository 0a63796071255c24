//! Broker layer: the ordered message log and its live subscription fan-out.

pub mod contracts;
pub mod error;
pub mod hub;
pub mod journal;
pub mod store;
pub mod stream;

/// Returns the broker module name for smoke checks.
pub fn module_name() -> &'static str {
    "broker"
}
