//! The single task that owns the sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::Shared;
use super::queue::QueueEntry;
use super::types::{CloseResult, CloseStatus, SinkOp, StatsCell, TransportError, WriterState};
use crate::sink::BoxSink;
use crate::upload::ArtifactUploader;

/// Writes resolved events to the sink in submission order.
///
/// Owns the sink exclusively. It is the only place that writes, flushes or
/// closes it, and the only place that publishes the close outcome.
pub(crate) struct SequentialWriter {
  pub(crate) name: String,
  pub(crate) sink: BufWriter<BoxSink>,
  pub(crate) uploader: Arc<dyn ArtifactUploader>,
  pub(crate) shared: Arc<Shared>,
  pub(crate) abort: watch::Receiver<bool>,
  pub(crate) completion: watch::Sender<Option<CloseResult>>,
  pub(crate) flush_interval: Duration,
  pub(crate) last_flush: Instant,
  pub(crate) dirty: bool,
}

impl SequentialWriter {
  pub(crate) async fn run(mut self) {
    debug!(transport = %self.name, uploader = self.uploader.name(), "event writer started");

    let drained = self.drain().await;
    self.shared.state.set(WriterState::Closing);

    let outcome = match drained {
      Ok(status) => self.finish(status).await,
      Err(err) => self.fail(err).await,
    };

    let state = match outcome {
      Ok(_) => WriterState::ClosedOk,
      Err(_) => WriterState::ClosedErr,
    };
    self.shared.state.set(state);

    let stats = self.shared.stats.snapshot();
    match &outcome {
      Ok(status) => info!(
        transport = %self.name,
        ?status,
        written = stats.written,
        bytes = stats.bytes_written,
        "event stream closed"
      ),
      Err(err) => error!(transport = %self.name, kind = ?err.kind(), "event stream incomplete: {}", err),
    }
    self.completion.send_replace(Some(outcome));
  }

  fn aborted(&self) -> bool {
    *self.abort.borrow()
  }

  /// Pull events until the close sentinel, a failure or a cancellation.
  async fn drain(&mut self) -> Result<CloseStatus, TransportError> {
    loop {
      if self.aborted() {
        return Ok(CloseStatus::Cancelled);
      }

      let Some(entry) = self.shared.queue.pop(self.flush_interval).await else {
        self.flush_if_dirty().await?;
        continue;
      };

      let pending = match entry {
        QueueEntry::Close if self.aborted() => return Ok(CloseStatus::Cancelled),
        QueueEntry::Close => return Ok(CloseStatus::Completed),
        QueueEntry::Event(pending) => pending,
      };

      let (event, seq) = (pending.id.to_string(), pending.seq);
      let mut abort = self.abort.clone();
      let bytes = tokio::select! {
        biased;
        _ = abort.wait_for(|aborted| *aborted) => return Ok(CloseStatus::Cancelled),
        resolved = pending.resolve() => resolved?,
      };

      self
        .sink
        .write_all(&bytes)
        .await
        .map_err(|e| TransportError::sink(SinkOp::Write, &e))?;
      self.dirty = true;
      StatsCell::add(&self.shared.stats.written, 1);
      StatsCell::add(&self.shared.stats.bytes_written, bytes.len() as u64);
      debug!(transport = %self.name, %event, seq, bytes = bytes.len(), "event written");

      if self.last_flush.elapsed() >= self.flush_interval {
        self.flush_if_dirty().await?;
      }
    }
  }

  async fn flush_if_dirty(&mut self) -> Result<(), TransportError> {
    if self.dirty {
      self
        .sink
        .flush()
        .await
        .map_err(|e| TransportError::sink(SinkOp::Flush, &e))?;
      self.dirty = false;
      debug!(transport = %self.name, "flushed sink");
    }
    self.last_flush = Instant::now();
    Ok(())
  }

  async fn finish(&mut self, status: CloseStatus) -> CloseResult {
    let closed = self.close_sink().await;
    self.uploader.shutdown();
    closed.map(|_| status)
  }

  async fn fail(&mut self, err: TransportError) -> CloseResult {
    let discarded = self.shared.queue.discard();
    StatsCell::add(&self.shared.stats.discarded, discarded as u64);
    if discarded > 0 {
      debug!(transport = %self.name, discarded, "discarding queued events after failure");
    }
    if let Err(close_err) = self.close_sink().await {
      warn!(transport = %self.name, "failed to close sink after error: {}", close_err);
    }
    self.uploader.shutdown();
    Err(err)
  }

  async fn close_sink(&mut self) -> Result<(), TransportError> {
    let flushed = self
      .sink
      .flush()
      .await
      .map_err(|e| TransportError::sink(SinkOp::Flush, &e));
    let closed = self
      .sink
      .shutdown()
      .await
      .map_err(|e| TransportError::sink(SinkOp::Close, &e));
    flushed.and(closed)
  }
}
