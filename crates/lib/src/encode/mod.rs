//! Event encoding.
//!
//! [`encode`] turns a [`BuildEvent`] plus the path mapping produced by the
//! uploader into the bytes of one self-delimited record. It is a pure function:
//! all I/O happens before it is called.
//!
//! # Submodules
//!
//! - [`frame`] - varint length-prefix framing used by the binary format

pub mod frame;

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{BuildEvent, FileLocation};
use crate::upload::PathMapping;

/// On-disk representation of the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFormat {
  /// Varint length-prefixed records holding compact JSON.
  #[default]
  Binary,
  /// One JSON document per line.
  Json,
  /// Pretty-printed JSON separated by blank lines. For humans only.
  Text,
}

impl EventFormat {
  pub fn as_str(self) -> &'static str {
    match self {
      EventFormat::Binary => "binary",
      EventFormat::Json => "json",
      EventFormat::Text => "text",
    }
  }
}

impl std::fmt::Display for EventFormat {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EventFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "binary" | "bin" => Ok(EventFormat::Binary),
      "json" | "jsonl" => Ok(EventFormat::Json),
      "text" | "txt" => Ok(EventFormat::Text),
      other => Err(format!("unknown event format '{}', expected binary, json or text", other)),
    }
  }
}

/// Static options applied to every event a transport encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
  pub format: EventFormat,
  /// Rewrite local paths into uploader references. When off, local paths are
  /// written verbatim and nothing is uploaded.
  pub path_conversion: bool,
}

impl Default for EncodeOptions {
  fn default() -> Self {
    Self {
      format: EventFormat::default(),
      path_conversion: true,
    }
  }
}

#[derive(Debug, Error)]
pub enum EncodeError {
  /// The uploader returned no reference for a local file.
  #[error("no uploaded reference for local file {path} in event {event}")]
  UnresolvedPath { event: String, path: PathBuf },

  #[error("failed to serialize event {event}: {message}")]
  Serialize { event: String, message: String },
}

/// Encode one event as a complete record in `options.format`.
pub fn encode(event: &BuildEvent, mapping: &PathMapping, options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
  let resolved = if options.path_conversion {
    event.map_files(|file| match &file.location {
      FileLocation::Path(path) => mapping
        .get(path)
        .map(|uri| FileLocation::Uri(uri.to_string()))
        .ok_or_else(|| EncodeError::UnresolvedPath {
          event: event.id.to_string(),
          path: path.clone(),
        }),
      other => Ok(other.clone()),
    })?
  } else {
    event.clone()
  };

  let serialize_err = |e: serde_json::Error| EncodeError::Serialize {
    event: event.id.to_string(),
    message: e.to_string(),
  };

  match options.format {
    EventFormat::Binary => {
      let payload = serde_json::to_vec(&resolved).map_err(serialize_err)?;
      let mut out = Vec::with_capacity(payload.len() + 4);
      frame::write_frame(&payload, &mut out);
      Ok(out)
    }
    EventFormat::Json => {
      let mut out = serde_json::to_vec(&resolved).map_err(serialize_err)?;
      out.push(b'\n');
      Ok(out)
    }
    EventFormat::Text => {
      let mut out = serde_json::to_vec_pretty(&resolved).map_err(serialize_err)?;
      out.extend_from_slice(b"\n\n");
      Ok(out)
    }
  }
}
