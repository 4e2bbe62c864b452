//! Types shared by the transport façade, its writer task and its callers.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::consts::{DEFAULT_FLUSH_INTERVAL, FLUSH_INTERVAL_ENV};
use crate::encode::EncodeOptions;

/// Sink operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOp {
  Write,
  Flush,
  Close,
}

impl std::fmt::Display for SinkOp {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SinkOp::Write => write!(f, "write"),
      SinkOp::Flush => write!(f, "flush"),
      SinkOp::Close => write!(f, "close"),
    }
  }
}

/// Coarse classification of a stream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  UploadTimeout,
  Upload,
  Encoding,
  SinkIo,
  Internal,
}

/// Why an event stream ended early.
///
/// Every variant means the stream on the sink is incomplete and should not be
/// trusted. The raw cause is kept only as a message so the outcome can be
/// shared by every observer of the close handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
  #[error("upload for event {event} timed out: {message}")]
  UploadTimeout { event: String, message: String },

  #[error("upload for event {event} failed: {message}")]
  UploadFailed { event: String, message: String },

  #[error("failed to encode event {event}: {message}")]
  Encoding { event: String, message: String },

  #[error("sink {op} failed: {message}")]
  SinkIo { op: SinkOp, message: String },

  /// The task resolving an event went away without producing a result.
  #[error("event {event} was lost before it could be written")]
  EventLost { event: String },

  /// The writer task stopped without reporting an outcome.
  #[error("event writer stopped unexpectedly")]
  WriterLost,
}

impl TransportError {
  pub(crate) fn sink(op: SinkOp, err: &std::io::Error) -> Self {
    TransportError::SinkIo {
      op,
      message: err.to_string(),
    }
  }

  pub fn kind(&self) -> FailureKind {
    match self {
      TransportError::UploadTimeout { .. } => FailureKind::UploadTimeout,
      TransportError::UploadFailed { .. } => FailureKind::Upload,
      TransportError::Encoding { .. } => FailureKind::Encoding,
      TransportError::SinkIo { .. } => FailureKind::SinkIo,
      TransportError::EventLost { .. } | TransportError::WriterLost => FailureKind::Internal,
    }
  }
}

/// How a stream that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseStatus {
  /// Every event queued before `close()` was written.
  Completed,
  /// The close handle was cancelled; queued events were dropped.
  Cancelled,
}

pub type CloseResult = Result<CloseStatus, TransportError>;

/// Lifecycle of the writer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
  Running,
  Closing,
  ClosedOk,
  ClosedErr,
}

impl WriterState {
  fn as_u8(self) -> u8 {
    match self {
      WriterState::Running => 0,
      WriterState::Closing => 1,
      WriterState::ClosedOk => 2,
      WriterState::ClosedErr => 3,
    }
  }

  fn from_u8(value: u8) -> Self {
    match value {
      0 => WriterState::Running,
      1 => WriterState::Closing,
      2 => WriterState::ClosedOk,
      _ => WriterState::ClosedErr,
    }
  }

  pub fn is_closed(self) -> bool {
    matches!(self, WriterState::ClosedOk | WriterState::ClosedErr)
  }
}

impl std::fmt::Display for WriterState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WriterState::Running => write!(f, "running"),
      WriterState::Closing => write!(f, "closing"),
      WriterState::ClosedOk => write!(f, "closed"),
      WriterState::ClosedErr => write!(f, "failed"),
    }
  }
}

#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
  pub(crate) fn new() -> Self {
    Self(AtomicU8::new(WriterState::Running.as_u8()))
  }

  pub(crate) fn get(&self) -> WriterState {
    WriterState::from_u8(self.0.load(Ordering::Acquire))
  }

  pub(crate) fn set(&self, state: WriterState) {
    self.0.store(state.as_u8(), Ordering::Release);
  }
}

/// Counters describing a transport's traffic so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
  /// Events accepted by `send`.
  pub submitted: u64,
  /// Events appended to the sink.
  pub written: u64,
  pub bytes_written: u64,
  /// Events rejected because the stream was closing.
  pub dropped: u64,
  /// Accepted events thrown away by a failure or cancellation.
  pub discarded: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCell {
  pub(crate) submitted: AtomicU64,
  pub(crate) written: AtomicU64,
  pub(crate) bytes_written: AtomicU64,
  pub(crate) dropped: AtomicU64,
  pub(crate) discarded: AtomicU64,
}

impl StatsCell {
  pub(crate) fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
  }

  pub(crate) fn snapshot(&self) -> TransportStats {
    TransportStats {
      submitted: self.submitted.load(Ordering::Relaxed),
      written: self.written.load(Ordering::Relaxed),
      bytes_written: self.bytes_written.load(Ordering::Relaxed),
      dropped: self.dropped.load(Ordering::Relaxed),
      discarded: self.discarded.load(Ordering::Relaxed),
    }
  }
}

/// Configuration for an [`EventTransport`](super::EventTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
  /// Name used in log records.
  pub name: String,
  /// Longest time written bytes may sit unflushed while the queue is idle.
  pub flush_interval: Duration,
  pub encode: EncodeOptions,
}

impl Default for TransportConfig {
  fn default() -> Self {
    Self {
      name: "file".to_string(),
      flush_interval: DEFAULT_FLUSH_INTERVAL,
      encode: EncodeOptions::default(),
    }
  }
}

impl TransportConfig {
  /// Defaults, with the flush interval taken from `BES_FLUSH_INTERVAL_MS`
  /// when it holds a positive integer.
  pub fn from_env() -> Self {
    let mut config = Self::default();
    if let Ok(raw) = std::env::var(FLUSH_INTERVAL_ENV) {
      match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => config.flush_interval = Duration::from_millis(ms),
        _ => warn!(var = FLUSH_INTERVAL_ENV, value = %raw, "ignoring invalid flush interval"),
      }
    }
    config
  }

  pub fn with_name(mut self, name: &str) -> Self {
    self.name = name.to_string();
    self
  }

  /// Zero is raised to one millisecond so an idle writer never spins.
  pub fn with_flush_interval(mut self, interval: Duration) -> Self {
    self.flush_interval = interval.max(Duration::from_millis(1));
    self
  }

  pub fn with_encode(mut self, encode: EncodeOptions) -> Self {
    self.encode = encode;
    self
  }
}
