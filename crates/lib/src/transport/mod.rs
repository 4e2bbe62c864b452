//! Ordered, asynchronous delivery of build events to a sink.
//!
//! [`EventTransport::send`] never blocks: it starts resolving the event's
//! local files in the background and queues a handle to the result. A single
//! writer task drains that queue in submission order, waiting on each handle
//! in turn, so the sink sees events in exactly the order they were sent no
//! matter which uploads finish first.
//!
//! # Shutdown
//!
//! [`EventTransport::close`] queues a close marker and returns a
//! [`CloseHandle`]. The writer writes everything queued before the marker,
//! flushes and closes the sink, then shuts the uploader down. Calling
//! [`CloseHandle::cancel`] instead drops the backlog and stops the writer as
//! soon as possible.
//!
//! Any upload, encoding or sink failure ends the stream: remaining events are
//! discarded and the handle resolves to a [`TransportError`].
//!
//! # Submodules
//!
//! - [`types`] - errors, lifecycle state, counters and configuration
//! - `queue` - the submission queue and pending event handles
//! - `writer` - the sink-owning writer task
//! - `completion` - the close handle

mod completion;
mod queue;
pub mod types;
mod writer;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::BufWriter;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::encode::{EncodeOptions, encode};
use crate::event::BuildEvent;
use crate::sink::{BoxSink, file_sink};
use crate::upload::{ArtifactUploader, PathMapping};

pub use completion::CloseHandle;
pub use types::*;

use queue::{PendingError, PendingEvent, SubmissionQueue};
use writer::SequentialWriter;

/// State shared between the façade, the writer task and close handles.
#[derive(Debug)]
pub(crate) struct Shared {
  pub(crate) queue: SubmissionQueue,
  pub(crate) abort: watch::Sender<bool>,
  pub(crate) state: StateCell,
  pub(crate) stats: StatsCell,
}

/// Streams build events to one sink.
///
/// `send` may be called from any thread, including threads outside the tokio
/// runtime the transport was created on.
pub struct EventTransport {
  name: String,
  shared: Arc<Shared>,
  uploader: Arc<dyn ArtifactUploader>,
  options: EncodeOptions,
  runtime: Handle,
  close_handle: CloseHandle,
  closing: AtomicBool,
}

impl std::fmt::Debug for EventTransport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EventTransport")
      .field("name", &self.name)
      .field("uploader", &self.uploader.name())
      .field("state", &self.state())
      .finish()
  }
}

impl EventTransport {
  /// Start a transport writing to `sink`.
  ///
  /// # Panics
  ///
  /// Panics if called outside a tokio runtime.
  pub fn new(sink: BoxSink, uploader: Arc<dyn ArtifactUploader>, config: TransportConfig) -> Self {
    let runtime = Handle::current();
    let (abort_tx, abort_rx) = watch::channel(false);
    let (completion_tx, completion_rx) = watch::channel(None);

    let shared = Arc::new(Shared {
      queue: SubmissionQueue::new(),
      abort: abort_tx,
      state: StateCell::new(),
      stats: StatsCell::default(),
    });

    let writer = SequentialWriter {
      name: config.name.clone(),
      sink: BufWriter::new(sink),
      uploader: uploader.clone(),
      shared: shared.clone(),
      abort: abort_rx,
      completion: completion_tx,
      flush_interval: config.flush_interval,
      last_flush: Instant::now(),
      dirty: false,
    };
    runtime.spawn(writer.run());

    info!(
      transport = %config.name,
      uploader = uploader.name(),
      format = %config.encode.format,
      "event transport started"
    );

    Self {
      name: config.name,
      close_handle: CloseHandle::new(shared.clone(), completion_rx),
      shared,
      uploader,
      options: config.encode,
      runtime,
      closing: AtomicBool::new(false),
    }
  }

  /// Start a transport writing to a new file at `path`.
  pub async fn create_file(
    path: &Path,
    uploader: Arc<dyn ArtifactUploader>,
    config: TransportConfig,
  ) -> std::io::Result<Self> {
    let sink = file_sink(path).await?;
    debug!(path = %path.display(), "opened event stream file");
    Ok(Self::new(sink, uploader, config))
  }

  /// Queue `event` for writing.
  ///
  /// Returns immediately. Events sent after `close()` or after the stream has
  /// failed are dropped with a warning.
  pub fn send(&self, event: BuildEvent) {
    let id = event.id.clone();
    let (tx, rx) = oneshot::channel();

    let pushed = match self.state() {
      WriterState::Running => self.shared.queue.push(PendingEvent::new(id.clone(), rx)).ok(),
      _ => None,
    };
    let Some(seq) = pushed else {
      StatsCell::add(&self.shared.stats.dropped, 1);
      warn!(transport = %self.name, event = %id, state = %self.state(), "dropping event sent after close");
      return;
    };
    StatsCell::add(&self.shared.stats.submitted, 1);

    let paths = if self.options.path_conversion {
      event.local_paths()
    } else {
      BTreeSet::new()
    };
    let uploader = self.uploader.clone();
    let options = self.options;

    self.runtime.spawn(async move {
      let encoded = match resolve_paths(uploader.as_ref(), paths).await {
        Ok(mapping) => encode(&event, &mapping, &options).map_err(PendingError::Encode),
        Err(err) => Err(err),
      };
      if let Err(err) = &encoded {
        debug!(event = %id, seq, error = ?err, "event resolution failed");
      }
      // The writer may have stopped waiting.
      let _ = tx.send(encoded);
    });
  }

  /// Begin a graceful close and return the handle for its outcome.
  ///
  /// Idempotent: every call returns a handle to the same outcome.
  pub fn close(&self) -> CloseHandle {
    if !self.closing.swap(true, Ordering::AcqRel) && self.shared.queue.close() {
      info!(transport = %self.name, queued = self.shared.queue.len(), "closing event stream");
    }
    self.close_handle.clone()
  }

  pub fn uploader(&self) -> &Arc<dyn ArtifactUploader> {
    &self.uploader
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn state(&self) -> WriterState {
    self.shared.state.get()
  }

  pub fn stats(&self) -> TransportStats {
    self.shared.stats.snapshot()
  }
}

impl Drop for EventTransport {
  fn drop(&mut self) {
    if !self.closing.load(Ordering::Acquire) {
      debug!(transport = %self.name, "transport dropped without close, closing gracefully");
      self.close();
    }
  }
}

async fn resolve_paths(
  uploader: &dyn ArtifactUploader,
  paths: BTreeSet<PathBuf>,
) -> Result<PathMapping, PendingError> {
  if paths.is_empty() {
    return Ok(PathMapping::new());
  }
  uploader.resolve(paths).await.map_err(PendingError::Upload)
}
