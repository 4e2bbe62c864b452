//! Artifact upload collaborators.
//!
//! An [`ArtifactUploader`] turns the local files an event references into
//! references a stream consumer can follow. The transport asks for one
//! resolution per event and never waits on it from the caller's thread.
//!
//! # Submodules
//!
//! - [`local`] - `file://` references to files left in place
//! - [`store`] - content-addressed copies in a local store directory

pub mod local;
pub mod store;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use local::LocalFilesUploader;
pub use store::StoreUploader;

/// Errors an uploader can report for a resolution.
#[derive(Debug, Error)]
pub enum UploadError {
  #[error("file not found: {path}")]
  NotFound { path: PathBuf },

  #[error("failed to upload {path}: {message}")]
  Failed { path: PathBuf, message: String },

  /// The resolution did not finish within the uploader's deadline.
  #[error("upload timed out after {timeout:?}")]
  Timeout { timeout: Duration },

  #[error("uploader '{0}' has been shut down")]
  ShutDown(String),
}

impl UploadError {
  pub fn is_timeout(&self) -> bool {
    matches!(self, UploadError::Timeout { .. })
  }
}

/// Local path to sink-addressable reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMapping(HashMap<PathBuf, String>);

impl PathMapping {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, path: PathBuf, uri: String) {
    self.0.insert(path, uri);
  }

  pub fn get(&self, path: &Path) -> Option<&str> {
    self.0.get(path).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl FromIterator<(PathBuf, String)> for PathMapping {
  fn from_iter<I: IntoIterator<Item = (PathBuf, String)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

/// Resolves local files into references for the event stream.
///
/// `resolve` may be called concurrently for many events. `shutdown` must be
/// idempotent and safe to call when nothing was ever resolved.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
  fn name(&self) -> &str;

  async fn resolve(&self, paths: BTreeSet<PathBuf>) -> Result<PathMapping, UploadError>;

  fn shutdown(&self);
}
