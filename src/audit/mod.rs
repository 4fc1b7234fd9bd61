//! Call auditing: redaction, correlation and the session file.

mod entry;
mod error;
mod placeholder;
mod recorder;
mod redact;
mod session;
mod store;

pub use entry::{
    AuditEntry, CompletedCall, Section, SectionBody, SectionLabel, ENTRY_BANNER,
    NOTE_NO_MATCHING_REQUEST, NOTE_RESPONSE_PENDING, SECTION_DIVIDER, STORAGE_DISABLED_TAG,
};
pub use error::AuditError;
pub use placeholder::{classify, is_placeholder, Placeholder, ResponseKind, STREAM_HANDLE_KEYS};
pub use recorder::{CallRecorder, RequestOutcome, ResponseOutcome};
pub use redact::{
    capture, redact, redact_opt, Redactor, REDACTION_MARKER, UNSERIALIZABLE_FIELD,
    UNSERIALIZABLE_PAYLOAD,
};
pub use session::{Session, SessionWriter};
pub use store::{CallId, CorrelationStore, PendingCall};
