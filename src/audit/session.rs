//! The per-process audit session and its append-only writer.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::{mpsc, oneshot};

use super::error::AuditError;
use crate::config::AuditConfig;

/// One audit destination: an identifier plus the file entries go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    started_at: DateTime<Utc>,
    pid: u32,
    log_path: PathBuf,
}

impl Session {
    /// Start a session whose file lives in `log_dir`.
    ///
    /// The id combines the start time (millisecond precision) with the
    /// process id, so concurrently running processes never share a file.
    pub fn start(log_dir: &Path) -> Self {
        let started_at = Utc::now();
        let pid = std::process::id();
        let id = format!("{}-{}", started_at.format("%Y%m%d-%H%M%S%.3f"), pid);
        let log_path = log_dir.join(format!("session-{id}.log"));
        Self {
            id,
            started_at,
            pid,
            log_path,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Header written once, when the session file is first created.
    pub fn header(&self) -> String {
        format!(
            "=== calltape audit session {} ===\nStarted: {}\nPID: {}\n\n",
            self.id,
            self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.pid
        )
    }
}

enum WriterCommand {
    Append(String),
    Flush(oneshot::Sender<()>),
}

struct ActiveWriter {
    session: Session,
    tx: mpsc::UnboundedSender<WriterCommand>,
    worker: Option<JoinHandle<()>>,
}

/// Fire-and-forget writer for one [`Session`].
///
/// `append` only enqueues; a dedicated thread owns the file. Nothing touches
/// the filesystem until the first entry arrives, and a disabled writer never
/// touches it at all. I/O failures are reported through `tracing` and the
/// entry is dropped; the next entry tries again.
pub struct SessionWriter {
    active: Option<ActiveWriter>,
}

impl SessionWriter {
    pub fn new(config: &AuditConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        Self::start(Session::start(&config.log_dir))
    }

    /// An inert writer: every operation is a no-op.
    pub fn disabled() -> Self {
        Self { active: None }
    }

    fn start(session: Session) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = SessionSink::new(session.clone());

        let worker = std::thread::Builder::new()
            .name("calltape-writer".to_string())
            .spawn(move || run_writer(rx, sink));

        match worker {
            Ok(worker) => Self {
                active: Some(ActiveWriter {
                    session,
                    tx,
                    worker: Some(worker),
                }),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start audit writer thread; auditing disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// Queue `text` for the session file and return immediately.
    pub fn append(&self, text: String) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if active.tx.send(WriterCommand::Append(text)).is_err() {
            tracing::warn!(
                path = %active.session.log_path().display(),
                "Audit writer stopped; entry dropped"
            );
        }
    }

    /// Wait until everything appended so far has been written.
    pub async fn flush(&self) {
        if let Some(done) = self.request_flush() {
            let _ = done.await;
        }
    }

    /// Blocking variant of [`SessionWriter::flush`].
    ///
    /// Must not be called from inside an async runtime.
    pub fn flush_blocking(&self) {
        if let Some(done) = self.request_flush() {
            let _ = done.blocking_recv();
        }
    }

    fn request_flush(&self) -> Option<oneshot::Receiver<()>> {
        let active = self.active.as_ref()?;
        let (done_tx, done_rx) = oneshot::channel();
        active.tx.send(WriterCommand::Flush(done_tx)).ok()?;
        Some(done_rx)
    }
}

impl Drop for SessionWriter {
    fn drop(&mut self) {
        if let Some(ActiveWriter { tx, worker, .. }) = self.active.take() {
            // Closing the channel lets the worker drain what is queued and exit.
            drop(tx);
            if let Some(worker) = worker {
                let _ = worker.join();
            }
        }
    }
}

fn run_writer(mut rx: mpsc::UnboundedReceiver<WriterCommand>, mut sink: SessionSink) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            WriterCommand::Append(text) => {
                if let Err(err) = sink.append(&text) {
                    tracing::warn!(error = %err, "Dropped audit entry");
                }
            }
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// The session file, opened lazily on the writer thread.
struct SessionSink {
    session: Session,
    file: Option<BufWriter<File>>,
}

impl SessionSink {
    fn new(session: Session) -> Self {
        Self {
            session,
            file: None,
        }
    }

    fn append(&mut self, text: &str) -> Result<(), AuditError> {
        let path = self.session.log_path().to_path_buf();
        let file = self.open()?;

        let result = file
            .write_all(text.as_bytes())
            .and_then(|_| file.flush());

        if let Err(source) = result {
            // Reopen on the next entry instead of reusing a broken handle.
            self.file = None;
            return Err(AuditError::Write { path, source });
        }
        Ok(())
    }

    fn open(&mut self) -> Result<&mut BufWriter<File>, AuditError> {
        if self.file.is_none() {
            let path = self.session.log_path();
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|source| AuditError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| AuditError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
            let is_new = file.metadata().map(|m| m.len() == 0).unwrap_or(true);

            let mut writer = BufWriter::new(file);
            if is_new {
                writer
                    .write_all(self.session.header().as_bytes())
                    .and_then(|_| writer.flush())
                    .map_err(|source| AuditError::Write {
                        path: path.to_path_buf(),
                        source,
                    })?;
            }

            tracing::debug!(path = %path.display(), "Opened audit session file");
            self.file = Some(writer);
        }

        self.file.as_mut().ok_or_else(|| AuditError::Open {
            path: self.session.log_path().to_path_buf(),
            source: std::io::Error::other("session file unavailable"),
        })
    }
}
