//! Logging infrastructure
//!
//! Structured logging with tracing; console, JSON and file output.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogGuard};
