/// Errors surfaced by a [`CompletionClient`](super::CompletionClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The provider rejected or failed the call.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A payload could not be converted to or from the provider's wire format.
    #[error("Translation error: {0}")]
    Translation(String),

    /// A streamed completion ended abnormally.
    #[error("Stream closed: {0}")]
    StreamClosed(String),
}
