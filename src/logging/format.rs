//! JSON log lines: one JSON object per line (ndjson) for ingestion and audit.

use crate::error::{Error, Result};
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Line written by [`StructuredLogger::emit_json`] outside of tracing
#[derive(Debug, Serialize)]
pub struct LogEvent<'a> {
    pub ts: &'a str,
    pub level: &'a str,
    pub target: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a serde_json::Value>,
}

pub struct StructuredLogger;

impl StructuredLogger {
    /// Install the global subscriber: JSON lines or human format to stdout,
    /// level from RUST_LOG or `default_level`. A second call is a no-op.
    pub fn init(json: bool, default_level: &str) {
        let _ = Self::try_init(json, default_level);
    }

    /// Like [`init`](Self::init) but reports an already installed subscriber
    pub fn try_init(json: bool, default_level: &str) -> Result<()> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let installed = if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_thread_names(true)
                .with_writer(std::io::stdout);
            tracing_subscriber::registry().with(filter).with(fmt).try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_thread_names(true).with_writer(std::io::stdout))
                .try_init()
        };
        installed.map_err(|e| Error::invalid_usage(format!("logger is already installed: {e}")))
    }

    /// Emit a single structured log line (e.g. a statistic report) without going through tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(w, "{}", line);
        }
    }
}
