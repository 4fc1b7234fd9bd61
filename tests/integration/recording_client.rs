//! Integration tests for the recording client decorator
//!
//! Tests the flow: MockCompletionClient -> RecordingClient -> session file

use std::sync::Arc;
use std::time::Duration;

use calltape::client::mock::{MockCompletionClient, MockReply};
use calltape::client::{
    ClientError, Completion, CompletionClient, RecordingClient, WireTranslator,
};
use serde_json::{json, Value};

use super::common::AuditFixture;

/// Wraps requests as `{"wire": ...}` and unwraps responses.
struct EnvelopeTranslator;

impl WireTranslator for EnvelopeTranslator {
    fn to_wire(&self, request: &Value) -> Result<Value, ClientError> {
        Ok(json!({ "wire": request }))
    }

    fn from_wire(&self, response: &Value) -> Result<Value, ClientError> {
        response
            .get("wire")
            .cloned()
            .ok_or_else(|| ClientError::Translation("missing envelope".into()))
    }
}

#[tokio::test]
async fn test_shared_mock_sees_every_call() {
    let fixture = AuditFixture::new();
    let mock = Arc::new(
        MockCompletionClient::new()
            .with_reply(MockReply::Finished(json!({"id": "a"})))
            .with_reply(MockReply::Finished(json!({"id": "b"}))),
    );
    let client = RecordingClient::new(Arc::clone(&mock), Arc::clone(&fixture.recorder), "chat");

    client.complete(json!({"n": 1})).await.unwrap();
    client.complete(json!({"n": 2})).await.unwrap();

    assert_eq!(mock.captured_requests(), vec![json!({"n": 1}), json!({"n": 2})]);
    assert_eq!(mock.remaining_replies(), 0);

    let entries = fixture.entries().await;
    let completed: Vec<_> = entries.iter().filter(|e| e.is_completed()).collect();
    assert_eq!(completed.len(), 2);
    assert_ne!(completed[0].call_id, completed[1].call_id);
    assert!(completed.iter().all(|e| e.origin == "chat"));
}

#[tokio::test]
async fn test_translated_stream_records_both_aggregates() {
    let fixture = AuditFixture::new();
    let mock = MockCompletionClient::new()
        .with_reply(MockReply::Streaming(vec![
            json!({"wire": {"delta": "he"}}),
            json!({"wire": {"delta": "llo"}}),
        ]))
        .with_chunk_delay(Duration::from_millis(1));
    let client = RecordingClient::new(mock, Arc::clone(&fixture.recorder), "bridge")
        .with_translator(Arc::new(EnvelopeTranslator));

    let completion = client
        .complete(json!({"prompt": "hi", "headers": {"Authorization": "Bearer abcdefghijklmnop"}}))
        .await
        .unwrap();
    assert!(completion.is_streaming());
    let Completion::Streaming(stream) = completion else {
        unreachable!();
    };
    let chunks = stream.collect_chunks().await.unwrap();
    assert_eq!(chunks, vec![json!({"delta": "he"}), json!({"delta": "llo"})]);

    // The provider received the real header, wrapped.
    assert_eq!(
        client.inner().last_request(),
        Some(json!({"wire": {"prompt": "hi", "headers": {"Authorization": "Bearer abcdefghijklmnop"}}}))
    );

    let entries = fixture.entries().await;
    let done = entries.iter().find(|e| e.is_completed()).unwrap();
    assert_eq!(
        done.labels,
        vec![
            "REQUEST",
            "TRANSLATED REQUEST",
            "TRANSLATED RESPONSE",
            "BACK-TRANSLATED RESPONSE"
        ]
    );
    assert!(!done.text.contains("Bearer abcdefghijklmnop"));
    assert_eq!(done.text.matches("stream.aggregate").count(), 2);
    assert_eq!(fixture.recorder.pending_count(), 0);
}

#[tokio::test]
async fn test_unwrappable_response_is_a_translation_error() {
    let fixture = AuditFixture::new();
    let mock = MockCompletionClient::new().with_reply(MockReply::Finished(json!({"raw": 1})));
    let client = RecordingClient::new(mock, Arc::clone(&fixture.recorder), "bridge")
        .with_translator(Arc::new(EnvelopeTranslator));

    let err = client.complete(json!({"q": 1})).await.unwrap_err();
    assert_eq!(err, ClientError::Translation("missing envelope".into()));

    let entries = fixture.entries().await;
    let done = entries.iter().find(|e| e.is_completed()).unwrap();
    assert!(done.text.contains("Translation error: missing envelope"));
}

#[tokio::test]
async fn test_disabled_recorder_passes_calls_through() {
    let fixture = AuditFixture::disabled();
    let mock = MockCompletionClient::new().with_reply(MockReply::Streaming(vec![json!({"d": 1})]));
    let client = RecordingClient::new(mock, Arc::clone(&fixture.recorder), "chat");

    let Completion::Streaming(stream) = client.complete(json!({"q": 1})).await.unwrap() else {
        panic!("expected a stream");
    };
    assert_eq!(stream.collect_chunks().await.unwrap(), vec![json!({"d": 1})]);

    fixture.recorder.flush().await;
    assert!(!fixture.log_dir().exists());
}
