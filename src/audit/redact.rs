//! Secret redaction for audit payloads.
//!
//! Payloads bound for the audit log often carry the transport client's own
//! configuration next to the message content, live credentials included.
//! Everything persisted goes through [`redact`] (or a [`Redactor`]) first.
//!
//! Key masking is deliberately narrow and positional: top-level `headers` /
//! `defaultHeaders` maps and a top-level `apiKey`. Inline secrets that leak
//! into string values are handled by the optional pattern scrub.

use regex::Regex;
use serde::ser::{Impossible, SerializeMap, SerializeStruct, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

/// Sentinel written in place of every secret value.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Stand-in for a top-level field that refused to serialize.
pub const UNSERIALIZABLE_FIELD: &str = "[unserializable]";

/// Stand-in for a payload that could not be captured at all.
pub const UNSERIALIZABLE_PAYLOAD: &str = "[unserializable payload]";

/// Top-level fields holding a header map.
const HEADER_FIELDS: &[&str] = &["headers", "defaultHeaders"];

/// Header names (compared case-insensitively) whose values are secrets.
const SECRET_HEADERS: &[&str] = &["authorization", "x-api-key", "api-key"];

/// Top-level credential field.
const API_KEY_FIELD: &str = "apiKey";

/// Mask the known secret locations in a structural copy of `payload`.
///
/// `payload` itself is never touched. Null and empty payloads come back
/// as-is; a present `apiKey` is masked whatever its value.
pub fn redact(payload: &Value) -> Value {
    let mut copy = payload.clone();
    let Value::Object(map) = &mut copy else {
        return copy;
    };

    for field in HEADER_FIELDS {
        if let Some(Value::Object(headers)) = map.get_mut(*field) {
            for (name, value) in headers.iter_mut() {
                if SECRET_HEADERS.iter().any(|s| name.eq_ignore_ascii_case(s)) {
                    *value = Value::String(REDACTION_MARKER.to_string());
                }
            }
        }
    }

    if let Some(value) = map.get_mut(API_KEY_FIELD) {
        *value = Value::String(REDACTION_MARKER.to_string());
    }

    copy
}

/// [`redact`] for optional payload slots; absent stays absent.
pub fn redact_opt(payload: Option<&Value>) -> Option<Value> {
    payload.map(redact)
}

/// Convert an arbitrary host payload into a JSON value without failing.
///
/// A full serialization is attempted first. When some part of the payload
/// refuses to serialize (a live handle, a map with structured keys), each
/// top-level field is captured on its own and the failing ones are replaced
/// by [`UNSERIALIZABLE_FIELD`]. Lossy, but the rest of the payload survives.
pub fn capture<T: Serialize + ?Sized>(payload: &T) -> Value {
    match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(full_err) => match payload.serialize(ShallowCapture) {
            Ok(value) => {
                tracing::debug!(error = %full_err, "Captured payload shallowly");
                value
            }
            Err(err) => {
                tracing::debug!(error = %err, "Payload could not be captured");
                Value::String(UNSERIALIZABLE_PAYLOAD.to_string())
            }
        },
    }
}

/// Key masking plus optional regex scrubbing of string values.
#[derive(Debug, Clone)]
pub struct Redactor {
    patterns: Vec<Regex>,
}

impl Redactor {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    /// Key masking only, no string scrubbing.
    pub fn keys_only() -> Self {
        Self::new(Vec::new())
    }

    pub fn default_patterns() -> Vec<Regex> {
        // No look-behind in `regex`; `\b` keeps `sk-` from matching inside words.
        let raw = [
            r"\bsk-[A-Za-z0-9]{10,}",
            r"Bearer\s+[A-Za-z0-9._-]{10,}",
            r"(?i)anthropic[_-]?api[_-]?key\s*=\s*[A-Za-z0-9._-]{10,}",
            r"(?i)openai[_-]?api[_-]?key\s*=\s*[A-Za-z0-9._-]{10,}",
        ];
        raw.into_iter().filter_map(|p| Regex::new(p).ok()).collect()
    }

    pub fn redact(&self, payload: &Value) -> Value {
        let mut copy = redact(payload);
        if !self.patterns.is_empty() {
            self.scrub_value(&mut copy);
        }
        copy
    }

    pub fn redact_opt(&self, payload: Option<&Value>) -> Option<Value> {
        payload.map(|p| self.redact(p))
    }

    pub fn scrub_string(&self, input: &str) -> String {
        let mut out = input.to_string();
        for re in &self.patterns {
            out = re.replace_all(&out, REDACTION_MARKER).into_owned();
        }
        out
    }

    fn scrub_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => {
                if self.patterns.iter().any(|re| re.is_match(s)) {
                    *s = self.scrub_string(s);
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.scrub_value(v)),
            Value::Object(map) => map.values_mut().for_each(|v| self.scrub_value(v)),
            _ => {}
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(Self::default_patterns())
    }
}

/// Serializer that only understands a top-level map or struct and captures
/// every entry independently.
struct ShallowCapture;

fn not_a_record() -> serde_json::Error {
    <serde_json::Error as serde::ser::Error>::custom("shallow capture needs a map or struct")
}

fn capture_field<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(UNSERIALIZABLE_FIELD.into()))
}

fn capture_key<T: Serialize + ?Sized>(key: &T) -> String {
    match serde_json::to_value(key) {
        Ok(Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => UNSERIALIZABLE_FIELD.to_string(),
    }
}

struct ShallowRecord {
    map: Map<String, Value>,
    next_key: Option<String>,
}

impl ShallowRecord {
    fn new() -> Self {
        Self {
            map: Map::new(),
            next_key: None,
        }
    }
}

impl SerializeMap for ShallowRecord {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Self::Error> {
        self.next_key = Some(capture_key(key));
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self
            .next_key
            .take()
            .unwrap_or_else(|| UNSERIALIZABLE_FIELD.to_string());
        self.map.insert(key, capture_field(value));
        Ok(())
    }

    fn end(self) -> Result<Value, Self::Error> {
        Ok(Value::Object(self.map))
    }
}

impl SerializeStruct for ShallowRecord {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.map.insert(key.to_string(), capture_field(value));
        Ok(())
    }

    fn end(self) -> Result<Value, Self::Error> {
        Ok(Value::Object(self.map))
    }
}

type Unsupported = Impossible<Value, serde_json::Error>;

impl Serializer for ShallowCapture {
    type Ok = Value;
    type Error = serde_json::Error;
    type SerializeSeq = Unsupported;
    type SerializeTuple = Unsupported;
    type SerializeTupleStruct = Unsupported;
    type SerializeTupleVariant = Unsupported;
    type SerializeMap = ShallowRecord;
    type SerializeStruct = ShallowRecord;
    type SerializeStructVariant = Unsupported;

    fn serialize_map(self, _len: Option<usize>) -> Result<ShallowRecord, Self::Error> {
        Ok(ShallowRecord::new())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<ShallowRecord, Self::Error> {
        Ok(ShallowRecord::new())
    }

    // Wrappers (Option, newtypes) are looked through.
    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, Self::Error> {
        value.serialize(self)
    }

    fn serialize_bool(self, _v: bool) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_i8(self, _v: i8) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_i16(self, _v: i16) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_i32(self, _v: i32) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_i64(self, _v: i64) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_u8(self, _v: u8) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_u16(self, _v: u16) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_u32(self, _v: u32) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_u64(self, _v: u64) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_f32(self, _v: f32) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_f64(self, _v: f64) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_char(self, _v: char) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_str(self, _v: &str) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_none(self) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_unit(self) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Value, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Unsupported, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Unsupported, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Unsupported, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Unsupported, Self::Error> {
        Err(not_a_record())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Unsupported, Self::Error> {
        Err(not_a_record())
    }
}
