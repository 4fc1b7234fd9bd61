use std::path::PathBuf;

use thiserror::Error;

/// Failures inside the audit pipeline.
///
/// These never cross the recorder's public surface; the writer thread logs
/// them through `tracing` and moves on to the next entry.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Failed to create audit directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to open audit session file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write audit entry to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
