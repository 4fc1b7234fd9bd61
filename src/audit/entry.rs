//! Human-readable audit entries.
//!
//! Layout of one entry:
//!
//! ```text
//! [STORAGE DISABLED] 2026-10-18T09:15:02.114Z   <- tag only in that mode
//!
//! Call: r1 | Origin: chat
//! NOTE: response pending                        <- optional
//! REQUEST:
//! { ...pretty JSON... }
//! ----------------------------------------
//! RESPONSE:
//! { ...pretty JSON... }
//! ========================================
//! ```
//!
//! The text is meant for people reading the session file, not for parsers.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::store::CallId;

/// Line between two sections of an entry.
pub const SECTION_DIVIDER: &str = "----------------------------------------";
/// Closing line of every entry.
pub const ENTRY_BANNER: &str = "========================================";
/// Prefix of the first line while response storage is disabled upstream.
pub const STORAGE_DISABLED_TAG: &str = "[STORAGE DISABLED]";

pub const NOTE_RESPONSE_PENDING: &str = "response pending";
pub const NOTE_NO_MATCHING_REQUEST: &str = "no matching request found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLabel {
    Request,
    TranslatedRequest,
    TranslatedResponse,
    Response,
    BackTranslatedResponse,
}

impl SectionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionLabel::Request => "REQUEST",
            SectionLabel::TranslatedRequest => "TRANSLATED REQUEST",
            SectionLabel::TranslatedResponse => "TRANSLATED RESPONSE",
            SectionLabel::Response => "RESPONSE",
            SectionLabel::BackTranslatedResponse => "BACK-TRANSLATED RESPONSE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    Payload(Value),
    /// Stand-in text for a payload that does not exist (yet).
    Absent(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub label: SectionLabel,
    pub body: SectionBody,
}

impl Section {
    fn payload(label: SectionLabel, value: Value) -> Self {
        Self {
            label,
            body: SectionBody::Payload(value),
        }
    }

    fn absent(label: SectionLabel, text: &'static str) -> Self {
        Self {
            label,
            body: SectionBody::Absent(text),
        }
    }
}

/// Every payload slot of a finished call, already redacted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletedCall {
    pub request: Option<Value>,
    pub translated_request: Option<Value>,
    pub translated_response: Option<Value>,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq)]
enum EntryKind {
    Call {
        call_id: Option<CallId>,
        origin: String,
        note: Option<&'static str>,
        sections: Vec<Section>,
    },
    StorageDisabledMarker,
}

/// One formatted unit of the session file.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub storage_disabled: bool,
    kind: EntryKind,
}

impl AuditEntry {
    /// A request whose response is still outstanding.
    ///
    /// `request` is None when the call was opened from a deferred response.
    pub fn interim(
        call_id: &CallId,
        origin: &str,
        request: Option<Value>,
        translated_request: Option<Value>,
    ) -> Self {
        let mut sections = vec![request_section(request)];
        if let Some(translated) = translated_request {
            sections.push(Section::payload(SectionLabel::TranslatedRequest, translated));
        }
        sections.push(Section::absent(SectionLabel::Response, "(pending)"));

        Self::call(Some(call_id.clone()), origin, Some(NOTE_RESPONSE_PENDING), sections)
    }

    /// Request and response of one call, in fixed order.
    pub fn completed(call_id: Option<&CallId>, origin: &str, call: CompletedCall) -> Self {
        let mut sections = vec![request_section(call.request)];
        if let Some(translated) = call.translated_request {
            sections.push(Section::payload(SectionLabel::TranslatedRequest, translated));
        }
        sections.extend(response_sections(call.translated_response, call.response));

        Self::call(call_id.cloned(), origin, None, sections)
    }

    /// A response that arrived for an id nobody recorded a request for.
    pub fn uncorrelated(
        call_id: Option<&CallId>,
        origin: &str,
        translated_response: Option<Value>,
        response: Value,
    ) -> Self {
        let sections = response_sections(translated_response, response);
        Self::call(
            call_id.cloned(),
            origin,
            Some(NOTE_NO_MATCHING_REQUEST),
            sections,
        )
    }

    /// One-line marker written when storage-disabled mode first turns on.
    pub fn storage_disabled_marker() -> Self {
        Self {
            timestamp: Utc::now(),
            storage_disabled: true,
            kind: EntryKind::StorageDisabledMarker,
        }
    }

    pub fn with_storage_disabled(mut self, disabled: bool) -> Self {
        self.storage_disabled = disabled;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn note(&self) -> Option<&'static str> {
        match &self.kind {
            EntryKind::Call { note, .. } => *note,
            EntryKind::StorageDisabledMarker => None,
        }
    }

    pub fn sections(&self) -> &[Section] {
        match &self.kind {
            EntryKind::Call { sections, .. } => sections,
            EntryKind::StorageDisabledMarker => &[],
        }
    }

    fn call(
        call_id: Option<CallId>,
        origin: &str,
        note: Option<&'static str>,
        sections: Vec<Section>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            storage_disabled: false,
            kind: EntryKind::Call {
                call_id,
                origin: origin.to_string(),
                note,
                sections,
            },
        }
    }
}

fn request_section(request: Option<Value>) -> Section {
    match request {
        Some(request) => Section::payload(SectionLabel::Request, request),
        None => Section::absent(SectionLabel::Request, "(not captured)"),
    }
}

fn response_sections(translated_response: Option<Value>, response: Value) -> Vec<Section> {
    match translated_response {
        Some(translated) => vec![
            Section::payload(SectionLabel::TranslatedResponse, translated),
            Section::payload(SectionLabel::BackTranslatedResponse, response),
        ],
        None => vec![Section::payload(SectionLabel::Response, response)],
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);

        let (call_id, origin, note, sections) = match &self.kind {
            EntryKind::StorageDisabledMarker => {
                return writeln!(
                    f,
                    "{STORAGE_DISABLED_TAG} {timestamp} response storage disabled for the rest of this session"
                );
            }
            EntryKind::Call {
                call_id,
                origin,
                note,
                sections,
            } => (call_id, origin, note, sections),
        };

        if self.storage_disabled {
            write!(f, "{STORAGE_DISABLED_TAG} ")?;
        }
        writeln!(f, "{timestamp}")?;
        writeln!(f)?;

        let call_id = call_id.as_ref().map(CallId::as_str).unwrap_or("-");
        writeln!(f, "Call: {call_id} | Origin: {origin}")?;
        if let Some(note) = note {
            writeln!(f, "NOTE: {note}")?;
        }

        for (idx, section) in sections.iter().enumerate() {
            if idx > 0 {
                writeln!(f, "{SECTION_DIVIDER}")?;
            }
            writeln!(f, "{}:", section.label.as_str())?;
            match &section.body {
                SectionBody::Payload(value) => writeln!(f, "{}", pretty(value))?,
                SectionBody::Absent(text) => writeln!(f, "{text}")?,
            }
        }

        writeln!(f, "{ENTRY_BANNER}")?;
        writeln!(f)
    }
}
