//! Integration tests for the recorder's request/response lifecycle
//!
//! Each test drives a `CallRecorder` writing into its own temp directory and
//! then reads the session file back.

use std::sync::Arc;

use calltape::audit::{
    capture, redact, CallId, RequestOutcome, ResponseOutcome, REDACTION_MARKER,
    UNSERIALIZABLE_FIELD,
};
use serde::ser::{Serialize, Serializer};
use serde_json::json;

use super::common::{AuditFixture, MARKER_TEXT};

/// The canonical scenario: one request, one response, one combined entry.
#[test]
fn test_request_and_response_become_one_entry() {
    let fixture = AuditFixture::new();
    let recorder = &fixture.recorder;
    let id = CallId::from("r1");

    recorder.record_request(
        &id,
        &json!({"model": "x", "headers": {"authorization": "secret"}}),
        None,
        "testA",
    );
    recorder.record_response(Some(&id), None, &json!({"id": "resp1", "output": "ok"}), "testA");

    let entries = fixture.entries_blocking();
    let completed: Vec<_> = entries.iter().filter(|e| e.is_completed()).collect();
    assert_eq!(completed.len(), 1);

    let entry = completed[0];
    assert_eq!(entry.call_id, "r1");
    assert_eq!(entry.origin, "testA");
    assert_eq!(entry.labels, vec!["REQUEST", "RESPONSE"]);
    assert!(entry.text.contains(&format!("\"authorization\": \"{REDACTION_MARKER}\"")));
    assert!(!entry.text.contains("\"secret\""));
    assert!(entry.text.contains("\"id\": \"resp1\""));
    assert!(entry.text.contains("\"output\": \"ok\""));

    assert!(recorder.store().get(&id).is_none());
}

#[test]
fn test_interim_entry_precedes_completion() {
    let fixture = AuditFixture::new();
    let recorder = &fixture.recorder;
    let id = CallId::from("r1");

    recorder.record_request(&id, &json!({"model": "x"}), None, "chat");
    recorder.record_response(Some(&id), None, &json!({"id": "resp1"}), "chat");

    let entries = fixture.entries_blocking();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].note.as_deref(), Some("response pending"));
    assert!(entries[1].is_completed());
}

#[test]
fn test_session_file_has_single_header() {
    let fixture = AuditFixture::new();
    for i in 0..3 {
        fixture
            .recorder
            .record_request(&CallId::from(format!("r{i}")), &json!({"i": i}), None, "x");
    }

    let log = fixture.read_log_blocking();
    assert!(log.starts_with("=== calltape audit session "));
    assert_eq!(log.matches("=== calltape audit session").count(), 1);

    let session = fixture.recorder.session().unwrap();
    assert!(log.contains(&format!("PID: {}", std::process::id())));
    assert_eq!(session.log_path().parent(), Some(fixture.log_dir().as_path()));
}

#[test]
fn test_response_for_unknown_id_is_flagged() {
    let fixture = AuditFixture::new();
    let outcome = fixture.recorder.record_response(
        Some(&CallId::from("never-requested")),
        None,
        &json!({"id": "resp"}),
        "late",
    );
    assert_eq!(outcome, ResponseOutcome::Uncorrelated);

    let entries = fixture.entries_blocking();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].note.as_deref(), Some("no matching request found"));
    assert_eq!(entries[0].labels, vec!["RESPONSE"]);
}

#[test]
fn test_placeholder_never_completes_a_call() {
    let fixture = AuditFixture::new();
    let recorder = &fixture.recorder;
    let id = CallId::from("stream-1");

    recorder.record_request(&id, &json!({"stream": true, "model": "x"}), None, "chat");
    for placeholder in [json!({"controller": {}}), json!({}), json!(null), json!("chunk")] {
        let outcome = recorder.record_response(Some(&id), None, &placeholder, "chat");
        assert_eq!(outcome, ResponseOutcome::Deferred(id.clone()));
    }

    let entries = fixture.entries_blocking();
    assert_eq!(entries.len(), 1);
    assert!(entries.iter().all(|e| !e.is_completed()));
    assert!(recorder.store().contains(&id));
}

#[test]
fn test_disabled_recorder_leaves_no_trace() {
    let fixture = AuditFixture::disabled();
    let recorder = &fixture.recorder;
    let id = CallId::from("r1");

    assert_eq!(
        recorder.record_request(&id, &json!({"apiKey": "k"}), None, "x"),
        RequestOutcome::Disabled
    );
    recorder.record_response(Some(&id), None, &json!({"id": "resp"}), "x");
    recorder.record_response(None, None, &json!({"stream": {}}), "x");
    recorder.record_exchange(None, &json!({}), None, None, &json!({"a": 1}), "x");
    recorder.set_storage_disabled(true);
    recorder.flush_blocking();

    assert!(!recorder.is_enabled());
    assert!(recorder.session().is_none());
    assert!(!fixture.log_dir().exists());
    assert_eq!(std::fs::read_dir(fixture.dir.path()).unwrap().count(), 0);
}

#[test]
fn test_storage_disabled_tags_later_entries() {
    let fixture = AuditFixture::new();
    let recorder = &fixture.recorder;

    recorder.record_request(&CallId::from("before"), &json!({"n": 1}), None, "x");
    recorder.set_storage_disabled(true);
    recorder.record_request(&CallId::from("during"), &json!({"n": 2}), None, "x");
    recorder.set_storage_disabled(true);

    let log = fixture.read_log_blocking();
    assert_eq!(log.matches(MARKER_TEXT).count(), 1);

    let entries = fixture.entries_blocking();
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].first_line.starts_with("[STORAGE DISABLED]"));
    assert!(entries[1].first_line.starts_with("[STORAGE DISABLED] "));
}

#[test]
fn test_concurrent_calls_are_written_whole() {
    let fixture = AuditFixture::new();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let recorder = Arc::clone(&fixture.recorder);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let id = CallId::from(format!("t{t}-{i}"));
                    recorder.record_request(&id, &json!({"thread": t, "i": i}), None, "worker");
                    recorder.record_response(Some(&id), None, &json!({"ok": true}), "worker");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let entries = fixture.entries_blocking();
    let completed: Vec<_> = entries.iter().filter(|e| e.is_completed()).collect();
    assert_eq!(completed.len(), 200);
    assert!(completed.iter().all(|e| e.labels == vec!["REQUEST", "RESPONSE"]));
    assert_eq!(fixture.recorder.pending_count(), 0);
}

struct LiveHandle;

impl Serialize for LiveHandle {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(<S::Error as serde::ser::Error>::custom("live handle"))
    }
}

#[derive(serde::Serialize)]
struct HostRequest {
    model: String,
    #[serde(rename = "apiKey")]
    api_key: String,
    socket: LiveHandle,
}

#[test]
fn test_unserializable_host_payload_is_still_recorded() {
    let fixture = AuditFixture::new();
    let request = HostRequest {
        model: "x".into(),
        api_key: "sk-live".into(),
        socket: LiveHandle,
    };

    let captured = capture(&request);
    assert_eq!(captured["model"], json!("x"));
    assert_eq!(captured["socket"], json!(UNSERIALIZABLE_FIELD));

    fixture
        .recorder
        .record_request(&CallId::from("r1"), &captured, None, "host");

    let log = fixture.read_log_blocking();
    assert!(!log.contains("sk-live"));
    assert_eq!(redact(&captured)["apiKey"], json!(REDACTION_MARKER));
    // The host's value is untouched.
    assert_eq!(request.api_key, "sk-live");
}
