//! Hashing utilities for content-addressed uploads.
//!
//! This module provides:
//! - `ContentHash`: A full 64-character SHA-256 hash of file contents
//! - `hash_file()`: Streaming file hashing on the async runtime
//! - `hash_bytes()`: Arbitrary byte hashing

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// A full 64-character SHA256 hash identifying a blob.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// Two-character prefix used to shard blobs across directories.
  pub fn shard(&self) -> &str {
    let len = self.0.len().min(2);
    &self.0[..len]
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash a file's contents.
///
/// Reads in 8 KiB chunks so large artifacts are never held in memory.
pub async fn hash_file(path: &Path) -> std::io::Result<ContentHash> {
  let mut file = tokio::fs::File::open(path).await?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).await?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}
