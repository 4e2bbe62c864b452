//! Uploader that leaves files in place and references them by `file://` URI.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::debug;

use super::{ArtifactUploader, PathMapping, UploadError};
use crate::consts::FILE_URI_SCHEME;

/// Maps local paths to `file://` URIs.
///
/// Relative paths are taken relative to `base_dir`. Every file must exist when
/// it is resolved.
pub struct LocalFilesUploader {
  base_dir: PathBuf,
  shut_down: AtomicBool,
}

impl LocalFilesUploader {
  pub fn new(base_dir: impl Into<PathBuf>) -> Self {
    Self {
      base_dir: base_dir.into(),
      shut_down: AtomicBool::new(false),
    }
  }

  fn absolute(&self, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.base_dir.join(path)
    };
    dunce::simplified(&joined).to_path_buf()
  }
}

#[async_trait]
impl ArtifactUploader for LocalFilesUploader {
  fn name(&self) -> &str {
    "local"
  }

  async fn resolve(&self, paths: BTreeSet<PathBuf>) -> Result<PathMapping, UploadError> {
    if self.shut_down.load(Ordering::Acquire) {
      return Err(UploadError::ShutDown(self.name().to_string()));
    }

    let mut mapping = PathMapping::new();
    for path in paths {
      let absolute = self.absolute(&path);
      match tokio::fs::metadata(&absolute).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
          return Err(UploadError::NotFound { path: absolute });
        }
        Err(e) => {
          return Err(UploadError::Failed {
            path: absolute,
            message: e.to_string(),
          });
        }
      }
      let uri = path_to_file_uri(&absolute);
      debug!(path = %path.display(), uri = %uri, "resolved local file");
      mapping.insert(path, uri);
    }
    Ok(mapping)
  }

  fn shutdown(&self) {
    self.shut_down.store(true, Ordering::Release);
  }
}

/// Render an absolute path as a `file://` URI, percent-encoding anything
/// outside the unreserved set.
pub fn path_to_file_uri(path: &Path) -> String {
  let raw = path.to_string_lossy().replace('\\', "/");
  let mut uri = String::from(FILE_URI_SCHEME);
  // Windows drive paths (C:/...) still need the empty authority's slash.
  if !raw.starts_with('/') {
    uri.push('/');
  }
  for byte in raw.bytes() {
    match byte {
      b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' | b':' => uri.push(byte as char),
      other => uri.push_str(&format!("%{:02X}", other)),
    }
  }
  uri
}
