//! Completion clients and the decorator that audits them.

mod error;
pub mod mock;
mod recording;
mod translate;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

pub use error::ClientError;
pub use recording::RecordingClient;
pub use translate::WireTranslator;

/// Anything that turns a request into a completion.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: Value) -> Result<Completion, ClientError>;
}

#[async_trait]
impl<T: CompletionClient + ?Sized> CompletionClient for Arc<T> {
    async fn complete(&self, request: Value) -> Result<Completion, ClientError> {
        (**self).complete(request).await
    }
}

pub enum Completion {
    Finished(Value),
    Streaming(CompletionStream),
}

impl Completion {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Completion::Streaming(_))
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Finished(value) => f.debug_tuple("Finished").field(value).finish(),
            Completion::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// Receiving half of a streamed completion.
///
/// An `Err` item ends the stream.
pub struct CompletionStream {
    rx: mpsc::Receiver<Result<Value, ClientError>>,
}

impl CompletionStream {
    pub fn new(rx: mpsc::Receiver<Result<Value, ClientError>>) -> Self {
        Self { rx }
    }

    /// A connected sender/stream pair.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<Value, ClientError>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }

    pub async fn next(&mut self) -> Option<Result<Value, ClientError>> {
        self.rx.recv().await
    }

    /// Drain the stream, stopping at the first error.
    pub async fn collect_chunks(mut self) -> Result<Vec<Value>, ClientError> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next().await {
            chunks.push(chunk?);
        }
        Ok(chunks)
    }
}
