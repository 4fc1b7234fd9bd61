//! Classification of response-shaped values that are not responses yet.
//!
//! A streaming call hands back a handle long before the real response
//! exists. Logging that handle as "the response" would write garbage and
//! consume the call's correlation slot, so every response passes through
//! [`classify`] before the recorder completes a call.

use serde_json::Value;

/// Keys that mark an in-flight stream handle when they are an object's
/// only field.
pub const STREAM_HANDLE_KEYS: &[&str] = &["controller", "iterator", "stream"];

/// Why a value is not a completed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `{}`
    Empty,
    /// Null, scalars and arrays: not a structured record at all.
    NotARecord,
    /// An object whose single field is a known stream handle marker.
    StreamHandle,
}

impl Placeholder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Placeholder::Empty => "empty",
            Placeholder::NotARecord => "not-a-record",
            Placeholder::StreamHandle => "stream-handle",
        }
    }
}

impl std::fmt::Display for Placeholder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a candidate response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Complete,
    Placeholder(Placeholder),
}

impl ResponseKind {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ResponseKind::Placeholder(_))
    }
}

pub fn classify(value: &Value) -> ResponseKind {
    let Value::Object(map) = value else {
        return ResponseKind::Placeholder(Placeholder::NotARecord);
    };

    if map.is_empty() {
        return ResponseKind::Placeholder(Placeholder::Empty);
    }

    if map.len() == 1 && map.keys().all(|k| STREAM_HANDLE_KEYS.contains(&k.as_str())) {
        return ResponseKind::Placeholder(Placeholder::StreamHandle);
    }

    ResponseKind::Complete
}

pub fn is_placeholder(value: &Value) -> bool {
    classify(value).is_placeholder()
}
