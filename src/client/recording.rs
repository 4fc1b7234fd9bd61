use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ClientError, Completion, CompletionClient, CompletionStream, WireTranslator};
use crate::audit::{CallId, CallRecorder};

const STREAM_BUFFER: usize = 64;

/// Wraps a client and records every call it makes.
///
/// Recording never changes what the caller sees: responses, chunks and
/// errors pass through untouched.
pub struct RecordingClient<C> {
    inner: C,
    recorder: Arc<CallRecorder>,
    translator: Option<Arc<dyn WireTranslator>>,
    origin: String,
}

impl<C: CompletionClient> RecordingClient<C> {
    pub fn new(inner: C, recorder: Arc<CallRecorder>, origin: impl Into<String>) -> Self {
        Self {
            inner,
            recorder,
            translator: None,
            origin: origin.into(),
        }
    }

    /// Talk to `inner` in its own wire format.
    pub fn with_translator(mut self, translator: Arc<dyn WireTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn recorder(&self) -> &Arc<CallRecorder> {
        &self.recorder
    }

    fn record_failure(&self, id: &CallId, err: &ClientError) {
        self.recorder
            .record_response(Some(id), None, &error_payload(err), &self.origin);
    }

    fn finish(&self, id: &CallId, wire_response: Value) -> Result<Completion, ClientError> {
        let Some(translator) = &self.translator else {
            self.recorder
                .record_response(Some(id), None, &wire_response, &self.origin);
            return Ok(Completion::Finished(wire_response));
        };

        match translator.from_wire(&wire_response) {
            Ok(response) => {
                self.recorder.record_response(
                    Some(id),
                    Some(&wire_response),
                    &response,
                    &self.origin,
                );
                Ok(Completion::Finished(response))
            }
            Err(err) => {
                self.record_failure(id, &err);
                Err(err)
            }
        }
    }

    /// Re-emit `upstream` to the caller, recording the aggregate at the end.
    fn forward(&self, id: CallId, mut upstream: CompletionStream) -> CompletionStream {
        let (tx, stream) = CompletionStream::channel(STREAM_BUFFER);
        let recorder = Arc::clone(&self.recorder);
        let translator = self.translator.clone();
        let origin = self.origin.clone();

        tokio::spawn(async move {
            let mut wire_chunks = Vec::new();
            let mut chunks = Vec::new();

            while let Some(item) = upstream.next().await {
                let chunk = item.and_then(|wire| match &translator {
                    Some(translator) => {
                        let chunk = translator.from_wire_chunk(&wire);
                        wire_chunks.push(wire);
                        chunk
                    }
                    None => Ok(wire),
                });

                match chunk {
                    Ok(chunk) => {
                        chunks.push(chunk.clone());
                        if tx.send(Ok(chunk)).await.is_err() {
                            tracing::debug!(
                                call_id = %id,
                                origin = %origin,
                                chunks = chunks.len(),
                                "Stream consumer dropped; call left pending"
                            );
                            return;
                        }
                    }
                    Err(err) => {
                        recorder.record_response(Some(&id), None, &error_payload(&err), &origin);
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }
            }

            let translated = translator.as_ref().map(|_| aggregate(wire_chunks));
            recorder.record_response(Some(&id), translated.as_ref(), &aggregate(chunks), &origin);
        });

        stream
    }
}

#[async_trait]
impl<C: CompletionClient> CompletionClient for RecordingClient<C> {
    async fn complete(&self, request: Value) -> Result<Completion, ClientError> {
        let id = CallId::generate();

        let wire_request = match &self.translator {
            Some(translator) => match translator.to_wire(&request) {
                Ok(wire) => Some(wire),
                Err(err) => {
                    self.recorder
                        .record_request(&id, &request, None, &self.origin);
                    self.record_failure(&id, &err);
                    return Err(err);
                }
            },
            None => None,
        };

        self.recorder
            .record_request(&id, &request, wire_request.as_ref(), &self.origin);

        let outbound = wire_request.unwrap_or(request);
        match self.inner.complete(outbound).await {
            Ok(Completion::Finished(response)) => self.finish(&id, response),
            Ok(Completion::Streaming(stream)) => Ok(Completion::Streaming(self.forward(id, stream))),
            Err(err) => {
                self.record_failure(&id, &err);
                Err(err)
            }
        }
    }
}

/// What gets recorded as the response of a streamed call.
fn aggregate(chunks: Vec<Value>) -> Value {
    json!({
        "object": "stream.aggregate",
        "chunks": chunks,
    })
}

fn error_payload(err: &ClientError) -> Value {
    json!({ "error": err.to_string() })
}
