//! Audit fixtures and a small reader for session files.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use calltape::audit::{CallRecorder, ENTRY_BANNER};
use calltape::config::AuditConfig;
use tempfile::TempDir;

/// Text of the one-line storage-disabled marker.
pub const MARKER_TEXT: &str = "response storage disabled for the rest of this session";

/// A recorder whose session directory is a fresh temp dir.
pub struct AuditFixture {
    pub dir: TempDir,
    pub recorder: Arc<CallRecorder>,
}

impl AuditFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = AuditConfig::enabled_in(dir.path().join("audit"));
        let recorder = Arc::new(CallRecorder::new(&config));
        Self { dir, recorder }
    }

    /// Same layout as [`AuditFixture::new`], but with recording switched off.
    pub fn disabled() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = AuditConfig::enabled_in(dir.path().join("audit"));
        config.enabled = false;
        let recorder = Arc::new(CallRecorder::new(&config));
        Self { dir, recorder }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().join("audit")
    }

    /// Flush and read the session file. Empty if nothing was written.
    pub fn read_log_blocking(&self) -> String {
        self.recorder.flush_blocking();
        self.read_now()
    }

    pub async fn read_log(&self) -> String {
        self.recorder.flush().await;
        self.read_now()
    }

    pub fn entries_blocking(&self) -> Vec<LoggedEntry> {
        parse_entries(&self.read_log_blocking())
    }

    pub async fn entries(&self) -> Vec<LoggedEntry> {
        parse_entries(&self.read_log().await)
    }

    fn read_now(&self) -> String {
        self.recorder
            .session()
            .and_then(|s| fs::read_to_string(s.log_path()).ok())
            .unwrap_or_default()
    }
}

/// One entry of a session file, split into the parts tests care about.
#[derive(Debug, Clone)]
pub struct LoggedEntry {
    pub first_line: String,
    pub call_id: String,
    pub origin: String,
    pub note: Option<String>,
    pub labels: Vec<String>,
    pub text: String,
}

impl LoggedEntry {
    pub fn is_completed(&self) -> bool {
        self.note.is_none()
    }
}

/// Split a session file into entries. The header and marker lines are skipped.
pub fn parse_entries(log: &str) -> Vec<LoggedEntry> {
    log.split(ENTRY_BANNER)
        .filter_map(|chunk| {
            let lines: Vec<&str> = chunk.lines().collect();
            let call_idx = lines.iter().position(|l| l.starts_with("Call: "))?;
            // Timestamp line, blank line, then the call line.
            let start = call_idx.checked_sub(2)?;
            let lines = &lines[start..];

            let (call_id, origin) = lines[2]
                .trim_start_matches("Call: ")
                .split_once(" | Origin: ")?;

            Some(LoggedEntry {
                first_line: lines[0].to_string(),
                call_id: call_id.to_string(),
                origin: origin.to_string(),
                note: lines
                    .iter()
                    .find_map(|l| l.strip_prefix("NOTE: "))
                    .map(str::to_string),
                labels: lines
                    .iter()
                    .filter(|l| is_label(l))
                    .map(|l| l.trim_end_matches(':').to_string())
                    .collect(),
                text: lines.join("\n"),
            })
        })
        .collect()
}

fn is_label(line: &str) -> bool {
    line.ends_with(':')
        && line.len() > 1
        && line
            .trim_end_matches(':')
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == ' ' || c == '-')
}
