//! Structured logging contract for harness runs.
//!
//! Provides:
//! - [`LogEntry`]: canonical JSONL log record with required + optional fields.
//! - [`LogEmitter`]: writes JSONL lines to stdout, a file, or a buffer.
//! - [`validate_log_line`]: validates a single JSONL line against the schema.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Scenario outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`. The
/// optional fields carry allocator context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().to_string())
            .unwrap_or_else(|_| "0".to_string());
        Self {
            timestamp,
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            seed: None,
            step: None,
            op: None,
            addr: None,
            size: None,
            outcome: None,
            live_count: None,
            live_bytes: None,
            free_bytes: None,
            details: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    pub fn with_addr(mut self, addr: usize) -> Self {
        self.addr = Some(addr);
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_snapshot(mut self, live_count: usize, live_bytes: usize, free_bytes: usize) -> Self {
        self.live_count = Some(live_count);
        self.live_bytes = Some(live_bytes);
        self.free_bytes = Some(free_bytes);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

enum Sink {
    Stdout,
    File(std::io::BufWriter<std::fs::File>),
    Buffer(Vec<u8>),
}

/// Writes JSONL log lines and stamps sequential trace ids.
pub struct LogEmitter {
    sink: Sink,
    run_id: String,
    seq: u64,
}

impl LogEmitter {
    pub fn to_stdout(run_id: &str) -> Self {
        Self {
            sink: Sink::Stdout,
            run_id: run_id.to_string(),
            seq: 0,
        }
    }

    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self {
            sink: Sink::File(std::io::BufWriter::new(file)),
            run_id: run_id.to_string(),
            seq: 0,
        })
    }

    /// In-memory emitter for tests.
    #[must_use]
    pub fn to_buffer(run_id: &str) -> Self {
        Self {
            sink: Sink::Buffer(Vec::new()),
            run_id: run_id.to_string(),
            seq: 0,
        }
    }

    /// Emits an entry, stamping a sequential trace id if it has none.
    pub fn emit(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        match &mut self.sink {
            Sink::Stdout => writeln!(std::io::stdout(), "{line}"),
            Sink::File(w) => writeln!(w, "{line}"),
            Sink::Buffer(b) => writeln!(b, "{line}"),
        }
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.sink {
            Sink::Stdout => std::io::stdout().flush(),
            Sink::File(w) => w.flush(),
            Sink::Buffer(_) => Ok(()),
        }
    }

    /// Contents written so far, for buffer emitters.
    pub fn buffer_contents(&self) -> Option<&[u8]> {
        match &self.sink {
            Sink::Buffer(b) => Some(b),
            _ => None,
        }
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{:06}", self.run_id, self.seq)
    }
}

/// Schema violation found in a JSONL line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogSchemaError {
    #[error("line is not valid JSON: {0}")]
    NotJson(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` has wrong type")]
    WrongType { field: &'static str },
    #[error("unknown level `{0}`")]
    UnknownLevel(String),
}

/// Validates one JSONL line against the log schema.
pub fn validate_log_line(line: &str) -> Result<(), LogSchemaError> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| LogSchemaError::NotJson(e.to_string()))?;
    for field in ["timestamp", "trace_id", "event"] {
        match value.get(field) {
            None => return Err(LogSchemaError::MissingField(field)),
            Some(v) if !v.is_string() => return Err(LogSchemaError::WrongType { field }),
            Some(_) => {}
        }
    }
    let Some(level) = value.get("level") else {
        return Err(LogSchemaError::MissingField("level"));
    };
    let Some(level) = level.as_str() else {
        return Err(LogSchemaError::WrongType { field: "level" });
    };
    match level {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(LogSchemaError::UnknownLevel(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_roundtrips_through_jsonl() {
        let entry = LogEntry::new("run::000001", LogLevel::Info, "trace_start")
            .with_seed(7)
            .with_size(64)
            .with_outcome(Outcome::Pass);
        let line = entry.to_jsonl().unwrap();
        validate_log_line(&line).unwrap();
        let back: LogEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(back.seed, Some(7));
        assert_eq!(back.outcome, Some(Outcome::Pass));
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let line = LogEntry::new("t", LogLevel::Trace, "step").to_jsonl().unwrap();
        assert!(!line.contains("seed"));
        assert!(!line.contains("outcome"));
    }

    #[test]
    fn test_emitter_stamps_trace_ids() {
        let mut emitter = LogEmitter::to_buffer("run42");
        emitter
            .emit(LogEntry::new("", LogLevel::Info, "a"))
            .unwrap();
        emitter
            .emit(LogEntry::new("", LogLevel::Info, "b"))
            .unwrap();
        let text = String::from_utf8(emitter.buffer_contents().unwrap().to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            validate_log_line(line).unwrap();
        }
        assert!(lines[0].contains("run42::000001"));
        assert!(lines[1].contains("run42::000002"));
    }

    #[test]
    fn test_validate_rejects_bad_lines() {
        assert!(matches!(
            validate_log_line("not json"),
            Err(LogSchemaError::NotJson(_))
        ));
        assert_eq!(
            validate_log_line(r#"{"trace_id":"t","level":"info","event":"e"}"#),
            Err(LogSchemaError::MissingField("timestamp"))
        );
        assert_eq!(
            validate_log_line(r#"{"timestamp":"0","trace_id":"t","level":"loud","event":"e"}"#),
            Err(LogSchemaError::UnknownLevel("loud".to_string()))
        );
    }
}
