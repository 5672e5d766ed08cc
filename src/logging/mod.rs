//! Structured logging: tracing subscriber setup and one-off JSON lines.

mod format;

pub use format::{LogEvent, StructuredLogger};
