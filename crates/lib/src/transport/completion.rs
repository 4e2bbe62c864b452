//! The observable end of a transport.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::Shared;
use super::types::{CloseResult, StatsCell, TransportError};

/// Resolves once the writer task has stopped and the sink is closed.
///
/// Cloning is cheap and every clone observes the same outcome. Awaiting a
/// handle directly is the same as calling [`CloseHandle::wait`].
#[derive(Clone)]
pub struct CloseHandle {
  shared: Arc<Shared>,
  outcome: watch::Receiver<Option<CloseResult>>,
}

impl std::fmt::Debug for CloseHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CloseHandle")
      .field("state", &self.shared.state.get())
      .field("done", &self.is_done())
      .finish()
  }
}

impl CloseHandle {
  pub(crate) fn new(shared: Arc<Shared>, outcome: watch::Receiver<Option<CloseResult>>) -> Self {
    Self { shared, outcome }
  }

  /// Wait for the stream to end.
  pub async fn wait(&self) -> CloseResult {
    let mut outcome = self.outcome.clone();
    let done = match outcome.wait_for(Option::is_some).await {
      Ok(done) => (*done).clone(),
      Err(_) => None,
    };
    done.unwrap_or(Err(TransportError::WriterLost))
  }

  /// The outcome, if the stream has already ended.
  pub fn result(&self) -> Option<CloseResult> {
    self.outcome.borrow().clone()
  }

  pub fn is_done(&self) -> bool {
    self.outcome.borrow().is_some()
  }

  /// Stop the stream as soon as possible.
  ///
  /// Queued events are dropped, an in-flight resolution is abandoned and the
  /// sink is closed without writing anything further. The handle then resolves
  /// to [`CloseStatus::Cancelled`](super::CloseStatus::Cancelled). Returns
  /// false if the stream had already ended.
  pub fn cancel(&self) -> bool {
    if self.is_done() {
      return false;
    }
    let already = self.shared.abort.send_replace(true);
    if !already {
      let discarded = self.shared.queue.abort();
      StatsCell::add(&self.shared.stats.discarded, discarded as u64);
      info!(discarded, "event stream cancelled");
    }
    true
  }
}

impl IntoFuture for CloseHandle {
  type Output = CloseResult;
  type IntoFuture = Pin<Box<dyn Future<Output = CloseResult> + Send>>;

  fn into_future(self) -> Self::IntoFuture {
    Box::pin(async move { self.wait().await })
  }
}
