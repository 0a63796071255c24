//! Transport layer: a JSON-lines TCP protocol in front of the chat service.

pub mod server;
pub mod session;
pub mod wire;

/// Returns the transport module name for smoke checks.
pub fn module_name() -> &'static str {
    "transport"
}
