//! Structured logging for lifecycle and failure events.

mod logger;

pub use logger::{Logger, Severity};
