//! Logging utilities
//!
//! The crate itself only talks to the `log` facade. Applications and tests
//! call [`init`] or [`try_init`] once to route records through `env_logger`.

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
///
/// Panics if a logger has already been installed, like `env_logger::init`.
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system, ignoring an already installed logger
///
/// Returns `true` if this call installed the logger.
pub fn try_init() -> bool {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}
