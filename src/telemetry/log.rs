//! JSON-lines cycle log for log shippers (Loki, Vector, ...).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Best-effort structured record writer. Must never fail the caller.
pub trait LogSink: Send + Sync {
    fn write_structured(&self, record: &serde_json::Value);
}

/// Appends one JSON object per line to a file.
pub struct JsonLinesLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

impl LogSink for JsonLinesLog {
    fn write_structured(&self, record: &serde_json::Value) {
        if let Err(e) = self.append(&record.to_string()) {
            debug!(path = %self.path.display(), error = %e, "Cycle log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonLinesLog::new(dir.path().join("app.log"));
        log.write_structured(&json!({ "p95_s": 0.012, "anomaly": 0.0 }));
        log.write_structured(&json!({ "p95_s": 0.015, "anomaly": 0.41 }));

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["anomaly"], 0.41);
    }

    #[test]
    fn test_unwritable_path_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonLinesLog::new(dir.path().join("missing").join("app.log"));
        log.write_structured(&json!({ "ok": true }));
        assert!(!log.path().exists());
    }
}
