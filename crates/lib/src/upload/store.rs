//! Content-addressed uploader backed by a local store directory.
//!
//! Files are hashed and copied to `<root>/cas/<aa>/<sha256>`, and events
//! reference them as `cas://sha256/<sha256>`. Blobs already present in the
//! store are not copied again.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{ArtifactUploader, PathMapping, UploadError};
use crate::consts::{CAS_DIR, CAS_URI_PREFIX, DEFAULT_UPLOAD_PARALLELISM, DEFAULT_UPLOAD_TIMEOUT};
use crate::util::hash::{ContentHash, hash_file};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Configuration for [`StoreUploader`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
  /// Store root; blobs live under `<root>/cas`.
  pub root: PathBuf,
  /// Deadline for resolving all files of one event.
  pub timeout: Duration,
  /// Maximum number of files copied at once across all events.
  pub parallelism: usize,
}

impl StoreConfig {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      timeout: DEFAULT_UPLOAD_TIMEOUT,
      parallelism: DEFAULT_UPLOAD_PARALLELISM,
    }
  }
}

pub struct StoreUploader {
  root: PathBuf,
  timeout: Duration,
  semaphore: Arc<Semaphore>,
  shut_down: AtomicBool,
}

impl StoreUploader {
  pub fn new(config: StoreConfig) -> Self {
    Self {
      root: config.root,
      timeout: config.timeout,
      semaphore: Arc::new(Semaphore::new(config.parallelism.max(1))),
      shut_down: AtomicBool::new(false),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Where the blob with `hash` is stored.
  pub fn blob_path(&self, hash: &ContentHash) -> PathBuf {
    blob_path(&self.root, hash)
  }

  async fn upload_all(&self, paths: BTreeSet<PathBuf>) -> Result<PathMapping, UploadError> {
    let mut join_set = JoinSet::new();

    for path in paths {
      let root = self.root.clone();
      let semaphore = self.semaphore.clone();

      join_set.spawn(async move {
        let _permit = semaphore
          .acquire_owned()
          .await
          .map_err(|_| UploadError::ShutDown("store".to_string()))?;
        let uri = upload_one(&root, &path).await?;
        Ok::<_, UploadError>((path, uri))
      });
    }

    let mut mapping = PathMapping::new();
    while let Some(joined) = join_set.join_next().await {
      let (path, uri) = joined.map_err(|e| UploadError::Failed {
        path: self.root.clone(),
        message: format!("upload task failed: {}", e),
      })??;
      mapping.insert(path, uri);
    }
    Ok(mapping)
  }
}

#[async_trait]
impl ArtifactUploader for StoreUploader {
  fn name(&self) -> &str {
    "store"
  }

  async fn resolve(&self, paths: BTreeSet<PathBuf>) -> Result<PathMapping, UploadError> {
    if self.shut_down.load(Ordering::Acquire) {
      return Err(UploadError::ShutDown(self.name().to_string()));
    }
    if paths.is_empty() {
      return Ok(PathMapping::new());
    }

    let count = paths.len();
    match tokio::time::timeout(self.timeout, self.upload_all(paths)).await {
      Ok(result) => result,
      Err(_) => {
        warn!(files = count, timeout = ?self.timeout, "store upload timed out");
        Err(UploadError::Timeout { timeout: self.timeout })
      }
    }
  }

  fn shutdown(&self) {
    if !self.shut_down.swap(true, Ordering::AcqRel) {
      debug!(root = %self.root.display(), "store uploader shut down");
      self.semaphore.close();
    }
  }
}

fn blob_path(root: &Path, hash: &ContentHash) -> PathBuf {
  root.join(CAS_DIR).join(hash.shard()).join(&hash.0)
}

async fn upload_one(root: &Path, path: &Path) -> Result<String, UploadError> {
  let io_err = |e: std::io::Error| {
    if e.kind() == std::io::ErrorKind::NotFound {
      UploadError::NotFound {
        path: path.to_path_buf(),
      }
    } else {
      UploadError::Failed {
        path: path.to_path_buf(),
        message: e.to_string(),
      }
    }
  };

  let hash = hash_file(path).await.map_err(io_err)?;
  let dest = blob_path(root, &hash);

  if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
    debug!(path = %path.display(), hash = %hash, "blob already in store");
  } else {
    let failed = |e: std::io::Error| UploadError::Failed {
      path: path.to_path_buf(),
      message: e.to_string(),
    };
    if let Some(parent) = dest.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }
    // Copy beside the destination, then rename so readers never see a partial blob.
    let tmp = dest.with_extension(format!(
      "tmp-{}-{}",
      std::process::id(),
      TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    tokio::fs::copy(path, &tmp).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, &dest).await {
      let _ = tokio::fs::remove_file(&tmp).await;
      return Err(failed(e));
    }
    debug!(path = %path.display(), hash = %hash, "stored blob");
  }

  Ok(format!("{}{}", CAS_URI_PREFIX, hash))
}
