pub mod audit;
pub mod client;
pub mod config;
pub mod replay;
pub mod util;

pub use audit::{
    capture, redact, AuditError, CallId, CallRecorder, Redactor, RequestOutcome, ResponseOutcome,
};
pub use client::{ClientError, Completion, CompletionClient, RecordingClient, WireTranslator};
pub use config::AuditConfig;
