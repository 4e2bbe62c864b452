//! Submission queue between `send` callers and the writer task.
//!
//! The queue is strictly FIFO. A [`QueueEntry::Close`] marks the end of the
//! stream: once it has been inserted the queue is closed and later events are
//! rejected, so nothing can ever be dequeued after it.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;

use super::types::TransportError;
use crate::encode::EncodeError;
use crate::event::EventId;
use crate::upload::UploadError;

/// Why an event could not be turned into bytes.
#[derive(Debug)]
pub(crate) enum PendingError {
  Upload(UploadError),
  Encode(EncodeError),
}

impl PendingError {
  pub(crate) fn classify(self, event: &EventId) -> TransportError {
    let event = event.to_string();
    match self {
      PendingError::Upload(e) if e.is_timeout() => TransportError::UploadTimeout {
        event,
        message: e.to_string(),
      },
      PendingError::Upload(e) => TransportError::UploadFailed {
        event,
        message: e.to_string(),
      },
      PendingError::Encode(e) => TransportError::Encoding {
        event,
        message: e.to_string(),
      },
    }
  }
}

pub(crate) type PendingResult = Result<Vec<u8>, PendingError>;

/// The encoded form of one submitted event, available once its uploads finish.
#[derive(Debug)]
pub(crate) struct PendingEvent {
  pub(crate) id: EventId,
  pub(crate) seq: u64,
  rx: oneshot::Receiver<PendingResult>,
}

impl PendingEvent {
  pub(crate) fn new(id: EventId, rx: oneshot::Receiver<PendingResult>) -> Self {
    Self { id, seq: 0, rx }
  }

  /// Wait for the event's bytes.
  pub(crate) async fn resolve(self) -> Result<Vec<u8>, TransportError> {
    match self.rx.await {
      Ok(Ok(bytes)) => Ok(bytes),
      Ok(Err(err)) => Err(err.classify(&self.id)),
      Err(_) => Err(TransportError::EventLost {
        event: self.id.to_string(),
      }),
    }
  }
}

#[derive(Debug)]
pub(crate) enum QueueEntry {
  Event(PendingEvent),
  Close,
}

#[derive(Debug, Default)]
struct QueueInner {
  entries: VecDeque<QueueEntry>,
  closed: bool,
  next_seq: u64,
}

impl QueueInner {
  /// Drops every queued entry, returning how many were events.
  fn clear_events(&mut self) -> usize {
    let events = self
      .entries
      .iter()
      .filter(|entry| matches!(entry, QueueEntry::Event(_)))
      .count();
    self.entries.clear();
    events
  }
}

/// Unbounded FIFO with a single consumer.
#[derive(Debug, Default)]
pub(crate) struct SubmissionQueue {
  inner: Mutex<QueueInner>,
  notify: Notify,
}

impl SubmissionQueue {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Append an event, assigning its sequence number.
  ///
  /// Hands the event back if the queue has been closed.
  pub(crate) fn push(&self, mut pending: PendingEvent) -> Result<u64, PendingEvent> {
    let seq = {
      let mut inner = self.inner.lock();
      if inner.closed {
        return Err(pending);
      }
      let seq = inner.next_seq;
      inner.next_seq += 1;
      pending.seq = seq;
      inner.entries.push_back(QueueEntry::Event(pending));
      seq
    };
    self.notify.notify_one();
    Ok(seq)
  }

  /// Append the close sentinel. Returns false if the queue was already closed.
  pub(crate) fn close(&self) -> bool {
    {
      let mut inner = self.inner.lock();
      if inner.closed {
        return false;
      }
      inner.closed = true;
      inner.entries.push_back(QueueEntry::Close);
    }
    self.notify.notify_one();
    true
  }

  /// Drop everything queued and put a sentinel at the head.
  ///
  /// Returns the number of events dropped.
  pub(crate) fn abort(&self) -> usize {
    let dropped = {
      let mut inner = self.inner.lock();
      inner.closed = true;
      let dropped = inner.clear_events();
      inner.entries.push_back(QueueEntry::Close);
      dropped
    };
    self.notify.notify_one();
    dropped
  }

  /// Close the queue and drop everything in it without a sentinel.
  pub(crate) fn discard(&self) -> usize {
    let mut inner = self.inner.lock();
    inner.closed = true;
    inner.clear_events()
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.inner.lock().closed
  }

  pub(crate) fn len(&self) -> usize {
    self.inner.lock().entries.len()
  }

  /// Take the next entry, waiting at most `wait` for one to arrive.
  pub(crate) async fn pop(&self, wait: Duration) -> Option<QueueEntry> {
    let deadline = Instant::now() + wait;
    loop {
      let next = self.inner.lock().entries.pop_front();
      if next.is_some() {
        return next;
      }
      if tokio::time::timeout_at(deadline, self.notify.notified()).await.is_err() {
        return self.inner.lock().entries.pop_front();
      }
    }
  }
}
