//! Scripted completion client for deterministic testing
//!
//! Replies are handed out in the order they were queued; every request is
//! captured for later assertions. No network is involved.
//!
//! # Example
//! ```no_run
//! use calltape::client::mock::{MockCompletionClient, MockReply};
//! use serde_json::json;
//!
//! let client = MockCompletionClient::new()
//!     .with_reply(MockReply::Finished(json!({"id": "resp1"})))
//!     .with_reply(MockReply::Streaming(vec![json!({"delta": "a"})]));
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{ClientError, Completion, CompletionClient, CompletionStream};

/// One scripted outcome of `complete`.
#[derive(Clone, Debug)]
pub enum MockReply {
    Finished(Value),
    Streaming(Vec<Value>),
    /// Streams `chunks`, then ends with `ClientError::StreamClosed(message)`.
    StreamFailure { chunks: Vec<Value>, message: String },
    /// `complete` returns `ClientError::Upstream(message)`.
    Fail(String),
}

pub struct MockCompletionClient {
    replies: Mutex<VecDeque<MockReply>>,
    /// Requests exactly as they reached this client
    captured_requests: Arc<Mutex<Vec<Value>>>,
    /// Delay before each streamed chunk
    chunk_delay: Duration,
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            captured_requests: Arc::new(Mutex::new(Vec::new())),
            chunk_delay: Duration::ZERO,
        }
    }

    pub fn with_reply(self, reply: MockReply) -> Self {
        self.replies.lock().push_back(reply);
        self
    }

    /// Configure delay before each streamed chunk (default: Duration::ZERO)
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().push_back(reply);
    }

    pub fn remaining_replies(&self) -> usize {
        self.replies.lock().len()
    }

    pub fn captured_requests(&self) -> Vec<Value> {
        self.captured_requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<Value> {
        self.captured_requests.lock().last().cloned()
    }

    fn stream(&self, chunks: Vec<Value>, failure: Option<String>) -> CompletionStream {
        let (tx, stream) = CompletionStream::channel(32);
        let delay = self.chunk_delay;

        tokio::spawn(async move {
            for chunk in chunks {
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(chunk)).await.is_err() {
                    return; // Receiver dropped
                }
            }
            if let Some(message) = failure {
                let _ = tx.send(Err(ClientError::StreamClosed(message))).await;
            }
        });

        stream
    }
}

impl Default for MockCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, request: Value) -> Result<Completion, ClientError> {
        self.captured_requests.lock().push(request);

        let reply = self.replies.lock().pop_front();
        match reply {
            Some(MockReply::Finished(value)) => Ok(Completion::Finished(value)),
            Some(MockReply::Streaming(chunks)) => {
                Ok(Completion::Streaming(self.stream(chunks, None)))
            }
            Some(MockReply::StreamFailure { chunks, message }) => {
                Ok(Completion::Streaming(self.stream(chunks, Some(message))))
            }
            Some(MockReply::Fail(message)) => Err(ClientError::Upstream(message)),
            None => Err(ClientError::Upstream(
                "mock client has no scripted reply".to_string(),
            )),
        }
    }
}
