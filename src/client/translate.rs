use serde_json::Value;

use super::ClientError;

/// Converts between the host's request/response shapes and a provider's
/// wire format.
///
/// `to_wire` runs on the request leg; `from_wire` and `from_wire_chunk` run
/// on the response leg and produce what the host sees.
pub trait WireTranslator: Send + Sync {
    fn to_wire(&self, request: &Value) -> Result<Value, ClientError>;

    fn from_wire(&self, response: &Value) -> Result<Value, ClientError>;

    /// Convert one streamed chunk. Defaults to [`WireTranslator::from_wire`].
    fn from_wire_chunk(&self, chunk: &Value) -> Result<Value, ClientError> {
        self.from_wire(chunk)
    }
}
