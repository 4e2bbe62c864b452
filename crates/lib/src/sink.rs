//! Byte destinations for an event stream.
//!
//! A sink is any `AsyncWrite`. The transport's writer task is its only user for
//! the lifetime of the stream and shuts it down when the stream ends.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::io::AsyncWrite;

/// Boxed sink owned by a transport.
pub type BoxSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Open `path` as a sink, creating parent directories and truncating any
/// previous stream.
pub async fn file_sink(path: &Path) -> io::Result<BoxSink> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(parent).await?;
  }
  let file = tokio::fs::OpenOptions::new()
    .create(true)
    .write(true)
    .truncate(true)
    .open(path)
    .await?;
  Ok(Box::new(file))
}

#[derive(Debug, Default)]
struct MemoryState {
  data: Vec<u8>,
  flushed_len: usize,
  flushes: usize,
  shut_down: bool,
}

/// In-memory sink whose contents stay readable after the transport drops it.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
  state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
  pub fn new() -> Self {
    Self::default()
  }

  /// Everything written so far.
  pub fn contents(&self) -> Vec<u8> {
    self.state.lock().data.clone()
  }

  /// Bytes that were covered by a flush.
  pub fn flushed_contents(&self) -> Vec<u8> {
    let state = self.state.lock();
    state.data[..state.flushed_len].to_vec()
  }

  pub fn flush_count(&self) -> usize {
    self.state.lock().flushes
  }

  pub fn is_shut_down(&self) -> bool {
    self.state.lock().shut_down
  }

  pub fn boxed(&self) -> BoxSink {
    Box::new(self.clone())
  }
}

impl AsyncWrite for MemorySink {
  fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
    let mut state = self.state.lock();
    if state.shut_down {
      return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink is shut down")));
    }
    state.data.extend_from_slice(buf);
    Poll::Ready(Ok(buf.len()))
  }

  fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    let mut state = self.state.lock();
    state.flushed_len = state.data.len();
    state.flushes += 1;
    Poll::Ready(Ok(()))
  }

  fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    let mut state = self.state.lock();
    state.flushed_len = state.data.len();
    state.shut_down = true;
    Poll::Ready(Ok(()))
  }
}
