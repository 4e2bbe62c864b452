//! Shared helpers for transport integration tests.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bes_lib::encode::EventFormat;
use bes_lib::event::{BuildEvent, EventId, File};
use bes_lib::reader::decode_stream;
use bes_lib::sink::{BoxSink, MemorySink};
use bes_lib::transport::{EventTransport, TransportConfig};
use bes_lib::upload::{ArtifactUploader, PathMapping, UploadError};
use parking_lot::Mutex;
use tokio::io::AsyncWrite;
use tokio::sync::watch;

/// Flush interval used by tests that exercise idle flushing.
pub const TEST_FLUSH_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy)]
pub enum Failure {
  Timeout,
  Error,
}

/// Uploader whose per-path behaviour is scripted by the test.
///
/// Paths can be held behind a gate until the test opens it, delayed, or made
/// to fail. Every other path resolves to `test://<path>`.
#[derive(Default)]
pub struct ScriptedUploader {
  gates: Mutex<HashMap<PathBuf, watch::Sender<bool>>>,
  delays: Mutex<HashMap<PathBuf, Duration>>,
  failures: Mutex<HashMap<PathBuf, Failure>>,
  resolved: Mutex<Vec<PathBuf>>,
  shutdowns: AtomicUsize,
  watched_sink: Mutex<Option<MemorySink>>,
  sink_closed_at_shutdown: Mutex<Option<bool>>,
}

impl ScriptedUploader {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Hold resolutions of `path` until [`ScriptedUploader::open`] is called.
  pub fn gate(&self, path: impl Into<PathBuf>) {
    let (tx, _) = watch::channel(false);
    self.gates.lock().insert(path.into(), tx);
  }

  pub fn open(&self, path: impl AsRef<Path>) {
    if let Some(gate) = self.gates.lock().get(path.as_ref()) {
      gate.send_replace(true);
    }
  }

  pub fn delay(&self, path: impl Into<PathBuf>, delay: Duration) {
    self.delays.lock().insert(path.into(), delay);
  }

  pub fn fail(&self, path: impl Into<PathBuf>, failure: Failure) {
    self.failures.lock().insert(path.into(), failure);
  }

  /// Record whether `sink` was already shut down when the uploader is.
  pub fn watch_sink(&self, sink: &MemorySink) {
    *self.watched_sink.lock() = Some(sink.clone());
  }

  pub fn shutdowns(&self) -> usize {
    self.shutdowns.load(Ordering::SeqCst)
  }

  pub fn sink_closed_at_shutdown(&self) -> Option<bool> {
    *self.sink_closed_at_shutdown.lock()
  }

  /// Paths in the order their resolutions finished.
  pub fn resolved(&self) -> Vec<PathBuf> {
    self.resolved.lock().clone()
  }
}

#[async_trait]
impl ArtifactUploader for ScriptedUploader {
  fn name(&self) -> &str {
    "scripted"
  }

  async fn resolve(&self, paths: BTreeSet<PathBuf>) -> Result<PathMapping, UploadError> {
    for path in &paths {
      let gate = self.gates.lock().get(path).map(|tx| tx.subscribe());
      if let Some(mut gate) = gate {
        let _ = gate.wait_for(|open| *open).await;
      }

      let delay = self.delays.lock().get(path).copied();
      if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
      }

      let failure = self.failures.lock().get(path).copied();
      match failure {
        Some(Failure::Timeout) => {
          return Err(UploadError::Timeout {
            timeout: Duration::from_millis(1),
          });
        }
        Some(Failure::Error) => {
          return Err(UploadError::Failed {
            path: path.clone(),
            message: "scripted failure".to_string(),
          });
        }
        None => {}
      }
    }

    self.resolved.lock().extend(paths.iter().cloned());
    Ok(
      paths
        .into_iter()
        .map(|path| {
          let uri = format!("test://{}", path.display());
          (path, uri)
        })
        .collect(),
    )
  }

  fn shutdown(&self) {
    self.shutdowns.fetch_add(1, Ordering::SeqCst);
    let closed = self.watched_sink.lock().as_ref().map(MemorySink::is_shut_down);
    if let Some(closed) = closed {
      *self.sink_closed_at_shutdown.lock() = Some(closed);
    }
  }
}

/// Sink that accepts nothing.
pub struct FailingSink;

impl FailingSink {
  pub fn boxed() -> BoxSink {
    Box::new(FailingSink)
  }

  fn error() -> io::Error {
    io::Error::other("disk on fire")
  }
}

impl AsyncWrite for FailingSink {
  fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
    Poll::Ready(Err(Self::error()))
  }

  fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Poll::Ready(Err(Self::error()))
  }

  fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Poll::Ready(Err(Self::error()))
  }
}

/// Path referenced by [`artifact_event`] number `n`.
pub fn artifact_path(n: usize) -> PathBuf {
  PathBuf::from(format!("/out/artifact-{n}"))
}

/// A named set event referencing one local artifact.
pub fn artifact_event(n: usize) -> BuildEvent {
  BuildEvent::named_set(&n.to_string(), vec![File::path("artifact", artifact_path(n))])
}

/// A named set event with no files, so nothing is uploaded.
pub fn plain_event(id: &str) -> BuildEvent {
  BuildEvent::named_set(id, Vec::new())
}

pub fn config() -> TransportConfig {
  TransportConfig::default()
    .with_name("test")
    .with_flush_interval(TEST_FLUSH_INTERVAL)
}

/// A transport writing to a fresh memory sink.
pub fn memory_transport(uploader: Arc<ScriptedUploader>) -> (EventTransport, MemorySink) {
  let sink = MemorySink::new();
  let transport = EventTransport::new(sink.boxed(), uploader, config());
  (transport, sink)
}

/// Named set ids of every event written to `sink`.
pub fn written_ids(sink: &MemorySink) -> Vec<String> {
  let stream = decode_stream(&sink.contents(), EventFormat::Binary).unwrap();
  assert!(!stream.truncated, "stream should not end mid-record");
  stream
    .events
    .into_iter()
    .map(|event| match event.id {
      EventId::NamedSet { id } => id,
      other => panic!("unexpected event {other}"),
    })
    .collect()
}
