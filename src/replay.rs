//! JSONL scripts of recorder operations.
//!
//! One operation per line, tagged by `op`:
//!
//! ```text
//! {"op":"request","id":"r1","request":{"model":"x"},"origin":"testA"}
//! {"op":"response","id":"r1","response":{"id":"resp1"},"origin":"testA"}
//! {"op":"exchange","request":{...},"response":{...}}
//! {"op":"storage_disabled","disabled":true}
//! ```
//!
//! Blank lines are skipped.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::audit::{CallId, CallRecorder, RequestOutcome, ResponseOutcome};

const DEFAULT_ORIGIN: &str = "replay";

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptOp {
    Request {
        id: CallId,
        request: Value,
        #[serde(default)]
        translated_request: Option<Value>,
        #[serde(default = "default_origin")]
        origin: String,
    },
    Response {
        #[serde(default)]
        id: Option<CallId>,
        #[serde(default)]
        translated_response: Option<Value>,
        response: Value,
        #[serde(default = "default_origin")]
        origin: String,
    },
    Exchange {
        #[serde(default)]
        id: Option<CallId>,
        request: Value,
        #[serde(default)]
        translated_request: Option<Value>,
        #[serde(default)]
        translated_response: Option<Value>,
        response: Value,
        #[serde(default = "default_origin")]
        origin: String,
    },
    StorageDisabled {
        #[serde(default = "default_true")]
        disabled: bool,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Failed to read script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid operation on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub fn parse_script(input: &str) -> Result<Vec<ScriptOp>, ScriptError> {
    let mut ops = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let op = serde_json::from_str(line).map_err(|source| ScriptError::Parse {
            line: idx + 1,
            source,
        })?;
        ops.push(op);
    }
    Ok(ops)
}

pub fn read_script(path: &Path) -> Result<Vec<ScriptOp>, ScriptError> {
    let contents = fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_script(&contents)
}

/// Tally of what the recorder did with a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub recorded: usize,
    pub duplicates: usize,
    pub completed: usize,
    pub uncorrelated: usize,
    pub deferred: usize,
    pub exchanges: usize,
}

impl fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "recorded={} duplicates={} completed={} uncorrelated={} deferred={} exchanges={}",
            self.recorded,
            self.duplicates,
            self.completed,
            self.uncorrelated,
            self.deferred,
            self.exchanges
        )
    }
}

/// Apply `ops` to `recorder` in order.
pub fn replay(recorder: &CallRecorder, ops: &[ScriptOp]) -> ReplaySummary {
    let mut summary = ReplaySummary::default();

    for op in ops {
        match op {
            ScriptOp::Request {
                id,
                request,
                translated_request,
                origin,
            } => match recorder.record_request(id, request, translated_request.as_ref(), origin)
            {
                RequestOutcome::Recorded => summary.recorded += 1,
                RequestOutcome::Duplicate => summary.duplicates += 1,
                RequestOutcome::Disabled => {}
            },
            ScriptOp::Response {
                id,
                translated_response,
                response,
                origin,
            } => match recorder.record_response(
                id.as_ref(),
                translated_response.as_ref(),
                response,
                origin,
            ) {
                ResponseOutcome::Completed(_) => summary.completed += 1,
                ResponseOutcome::Uncorrelated => summary.uncorrelated += 1,
                ResponseOutcome::Deferred(_) => summary.deferred += 1,
                ResponseOutcome::Settled(_) => summary.duplicates += 1,
                ResponseOutcome::Disabled => {}
            },
            ScriptOp::Exchange {
                id,
                request,
                translated_request,
                translated_response,
                response,
                origin,
            } => {
                if !recorder.is_enabled() {
                    continue;
                }
                let pending = recorder.record_exchange(
                    id.as_ref(),
                    request,
                    translated_request.as_ref(),
                    translated_response.as_ref(),
                    response,
                    origin,
                );
                match pending {
                    Some(_) => summary.deferred += 1,
                    None => summary.exchanges += 1,
                }
            }
            ScriptOp::StorageDisabled { disabled } => recorder.set_storage_disabled(*disabled),
        }
    }

    summary
}
