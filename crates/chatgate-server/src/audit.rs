// crates/chatgate-server/src/audit.rs
// ============================================================================
// Module: Chatgate Audit Sinks
// Description: JSON-lines audit sinks for admission and approval events.
// Purpose: Route audit records to stderr or an append-only file.
// Dependencies: chatgate-core, chatgate-config, serde_json
// ============================================================================

//! ## Overview
//! Audit records are written one JSON object per line. Sinks never fail the
//! request that produced the record: serialization and write errors are
//! dropped. The file sink serializes writers behind a mutex and flushes after
//! every record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use chatgate_config::AuditConfig;
use chatgate_core::AuditEvent;
use chatgate_core::AuditSink;
use chatgate_core::NoopAuditSink;

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Builds the audit sink selected by configuration.
///
/// # Errors
///
/// Returns an error when the audit file cannot be opened.
pub fn audit_sink_from_config(config: &AuditConfig) -> io::Result<Arc<dyn AuditSink>> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => Ok(Arc::new(FileAuditSink::new(Path::new(path))?)),
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use std::fs;

    use chatgate_config::AuditConfig;
    use chatgate_core::AuditEvent;
    use chatgate_core::AuditEventKind;
    use chatgate_core::TraceId;
    use serde_json::Value;
    use serde_json::json;

    use super::audit_sink_from_config;

    #[test]
    fn file_sink_appends_one_json_line_per_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        let config = AuditConfig {
            enabled: true,
            path: Some(path.to_string_lossy().to_string()),
        };
        let sink = audit_sink_from_config(&config).expect("open sink");
        let trace = TraceId::new("t-audit");
        sink.record(&AuditEvent::new(AuditEventKind::RateLimited, &trace, json!({"limit": 2})));
        sink.record(&AuditEvent::new(
            AuditEventKind::ConcurrencyRejected,
            &trace,
            json!({"max_concurrent": 1}),
        ));

        let contents = fs::read_to_string(&path).expect("read audit log");
        let lines: Vec<Value> =
            contents.lines().map(|line| serde_json::from_str(line).expect("json line")).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "rate_limited");
        assert_eq!(lines[0]["trace_id"], "t-audit");
        assert_eq!(lines[0]["metadata"]["limit"], 2);
        assert_eq!(lines[1]["event"], "concurrency_rejected");
    }

    #[test]
    fn disabled_audit_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        let config = AuditConfig {
            enabled: false,
            path: Some(path.to_string_lossy().to_string()),
        };
        let sink = audit_sink_from_config(&config).expect("noop sink");
        sink.record(&AuditEvent::new(
            AuditEventKind::RateLimited,
            &TraceId::new("t"),
            Value::Null,
        ));
        assert!(!path.exists());
    }
}
