//! The call recorder: correlation, deferral and redaction in one place.
//!
//! Per call identifier the only valid path is `absent -> pending ->
//! completed`, where completing removes the identifier. Every public method
//! here is infallible from the caller's point of view: audit problems end up
//! in `tracing`, never in the host's request/response flow.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use super::entry::{AuditEntry, CompletedCall};
use super::placeholder::{classify, Placeholder, ResponseKind};
use super::redact::Redactor;
use super::session::{Session, SessionWriter};
use super::store::{CallId, CorrelationStore, PendingCall};
use crate::config::AuditConfig;

/// What `record_request` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Stored as pending; an interim entry was written.
    Recorded,
    /// The id is pending or its call already completed. Nothing changed.
    Duplicate,
    /// Auditing is off.
    Disabled,
}

/// What `record_response` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Matched a pending request; one combined entry was written.
    Completed(CallId),
    /// No pending request; a flagged response-only entry was written.
    Uncorrelated,
    /// The response was a placeholder. The call is (still) pending under
    /// the returned id.
    Deferred(CallId),
    /// A placeholder arrived for a call that already completed. Nothing
    /// was written.
    Settled(CallId),
    /// Auditing is off.
    Disabled,
}

pub struct CallRecorder {
    writer: SessionWriter,
    store: CorrelationStore,
    redactor: Redactor,
    storage_disabled: AtomicBool,
    marker_written: AtomicBool,
    // Keeps store transitions and their entries in the same order in the file.
    emit_order: Mutex<()>,
}

impl CallRecorder {
    pub fn new(config: &AuditConfig) -> Self {
        let redactor = if config.scrub_inline_secrets {
            Redactor::default()
        } else {
            Redactor::keys_only()
        };

        let recorder = Self {
            writer: SessionWriter::new(config),
            store: CorrelationStore::with_ttl(config.pending_ttl),
            redactor,
            storage_disabled: AtomicBool::new(false),
            marker_written: AtomicBool::new(false),
            emit_order: Mutex::new(()),
        };

        if let Some(session) = recorder.session() {
            tracing::info!(
                session_id = %session.id(),
                path = %session.log_path().display(),
                "Audit session started"
            );
        }
        recorder
    }

    /// Recorder configured from the config file and environment.
    pub fn from_env() -> Self {
        Self::new(&AuditConfig::load())
    }

    pub fn disabled() -> Self {
        Self::new(&AuditConfig::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_enabled()
    }

    pub fn session(&self) -> Option<&Session> {
        self.writer.session()
    }

    pub fn store(&self) -> &CorrelationStore {
        &self.store
    }

    pub fn pending_count(&self) -> usize {
        self.store.len()
    }

    /// Open a call: store the (redacted) request and write an interim entry.
    ///
    /// A second call for an id that is still pending, or whose call has
    /// already completed, is a no-op. Several code paths may report the same
    /// logical call without double entries.
    pub fn record_request(
        &self,
        id: &CallId,
        request: &Value,
        translated_request: Option<&Value>,
        origin: &str,
    ) -> RequestOutcome {
        if !self.is_enabled() {
            return RequestOutcome::Disabled;
        }
        if self.store.contains(id) || self.store.is_settled(id) {
            tracing::debug!(call_id = %id, origin, "Request already recorded");
            return RequestOutcome::Duplicate;
        }

        let request = self.redactor.redact(request);
        let translated_request = self.redactor.redact_opt(translated_request);
        let pending = PendingCall::new(Some(request.clone()), translated_request.clone(), origin);

        let _order = self.emit_order.lock();
        if !self.store.insert(id.clone(), pending) {
            tracing::debug!(call_id = %id, origin, "Request already recorded");
            return RequestOutcome::Duplicate;
        }
        self.emit(AuditEntry::interim(
            id,
            origin,
            Some(request),
            translated_request,
        ));
        RequestOutcome::Recorded
    }

    /// Close a call with its response.
    ///
    /// Placeholders (see [`classify`]) are never logged as responses; they
    /// open or keep a pending call instead. A response for an unknown id is
    /// still logged, flagged as uncorrelated.
    pub fn record_response(
        &self,
        id: Option<&CallId>,
        translated_response: Option<&Value>,
        response: &Value,
        origin: &str,
    ) -> ResponseOutcome {
        if !self.is_enabled() {
            return ResponseOutcome::Disabled;
        }
        if let ResponseKind::Placeholder(kind) = classify(response) {
            return self.defer(id, kind, origin);
        }

        let translated_response = self.redactor.redact_opt(translated_response);
        let response = self.redactor.redact(response);

        let _order = self.emit_order.lock();
        let pending = id.and_then(|id| self.store.take(id).map(|p| (id, p)));
        match pending {
            Some((id, pending)) => {
                // Stored payloads were redacted on the way in.
                let call = CompletedCall {
                    request: pending.request,
                    translated_request: pending.translated_request,
                    translated_response,
                    response,
                };
                let origin = joined_origin(&pending.origin, origin);
                self.emit(AuditEntry::completed(Some(id), &origin, call));
                ResponseOutcome::Completed(id.clone())
            }
            None => {
                tracing::debug!(
                    call_id = %id.map(CallId::as_str).unwrap_or("-"),
                    origin,
                    "Response without matching request"
                );
                self.emit(AuditEntry::uncorrelated(
                    id,
                    origin,
                    translated_response,
                    response,
                ));
                ResponseOutcome::Uncorrelated
            }
        }
    }

    /// Record a whole exchange in one call.
    ///
    /// If `response` is a placeholder this is `record_request` (with a fresh
    /// id when none is given) and the pending id is returned. Otherwise one
    /// completed entry is written, superseding any pending state for `id`;
    /// `id` counts as completed afterwards.
    pub fn record_exchange(
        &self,
        id: Option<&CallId>,
        request: &Value,
        translated_request: Option<&Value>,
        translated_response: Option<&Value>,
        response: &Value,
        origin: &str,
    ) -> Option<CallId> {
        if !self.is_enabled() {
            return None;
        }
        if classify(response).is_placeholder() {
            let id = id.cloned().unwrap_or_else(CallId::generate);
            self.record_request(&id, request, translated_request, origin);
            return Some(id);
        }

        let call = CompletedCall {
            request: Some(self.redactor.redact(request)),
            translated_request: self.redactor.redact_opt(translated_request),
            translated_response: self.redactor.redact_opt(translated_response),
            response: self.redactor.redact(response),
        };

        let _order = self.emit_order.lock();
        if let Some(id) = id {
            self.store.retire(id);
        }
        self.emit(AuditEntry::completed(id, origin, call));
        None
    }

    /// Track the upstream "responses are not stored" mode.
    ///
    /// The first switch to `true` writes a one-line marker; while the mode
    /// is on every entry's first line carries a visible tag. Correlation is
    /// unaffected.
    pub fn set_storage_disabled(&self, disabled: bool) {
        // The marker must land before any entry tagged by the new flag.
        let _order = self.emit_order.lock();
        self.storage_disabled.store(disabled, Ordering::SeqCst);
        if disabled && self.is_enabled() && !self.marker_written.swap(true, Ordering::SeqCst) {
            self.writer
                .append(AuditEntry::storage_disabled_marker().to_string());
        }
    }

    pub fn storage_disabled(&self) -> bool {
        self.storage_disabled.load(Ordering::SeqCst)
    }

    /// Wait until every entry written so far is on disk.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Blocking variant of [`CallRecorder::flush`]; not for async contexts.
    pub fn flush_blocking(&self) {
        self.writer.flush_blocking();
    }

    fn defer(&self, id: Option<&CallId>, kind: Placeholder, origin: &str) -> ResponseOutcome {
        let id = id.cloned().unwrap_or_else(CallId::generate);
        tracing::debug!(call_id = %id, placeholder = %kind, origin, "Deferring placeholder response");

        let _order = self.emit_order.lock();
        if self
            .store
            .insert(id.clone(), PendingCall::new(None, None, origin))
        {
            self.emit(AuditEntry::interim(&id, origin, None, None));
        } else if self.store.is_settled(&id) {
            tracing::debug!(call_id = %id, origin, "Placeholder for completed call ignored");
            return ResponseOutcome::Settled(id);
        }
        ResponseOutcome::Deferred(id)
    }

    fn emit(&self, entry: AuditEntry) {
        let entry = entry.with_storage_disabled(self.storage_disabled());
        self.writer.append(entry.to_string());
    }
}

fn joined_origin(request_origin: &str, response_origin: &str) -> String {
    if request_origin == response_origin || response_origin.is_empty() {
        request_origin.to_string()
    } else {
        format!("{request_origin} -> {response_origin}")
    }
}
