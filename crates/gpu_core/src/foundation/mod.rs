//! Foundation module - process-level utilities
//!
//! - Logging bootstrap

pub mod logging;
