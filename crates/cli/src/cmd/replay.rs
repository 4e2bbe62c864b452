//! Implementation of the `bes replay` command.
//!
//! Reads recorded build events and streams them through an event transport,
//! the same way a running build would.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, info};

use bes_lib::encode::{EncodeOptions, EventFormat};
use bes_lib::event::BuildEvent;
use bes_lib::transport::{CloseStatus, EventTransport, FailureKind, TransportConfig};
use bes_lib::upload::store::StoreConfig;
use bes_lib::upload::{ArtifactUploader, LocalFilesUploader, StoreUploader};

use crate::output::{OutputFormat, format_bytes, format_duration, print_json, print_stat, print_success, print_warning};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploaderKind {
  /// Reference files in place with file:// URIs
  #[default]
  Local,
  /// Copy files into a content-addressed store
  Store,
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
  pub events: PathBuf,
  pub out: PathBuf,
  pub format: EventFormat,
  pub flush_interval: Option<Duration>,
  pub uploader: UploaderKind,
  pub store_dir: Option<PathBuf>,
  pub upload_timeout: Duration,
  pub path_conversion: bool,
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
  output: PathBuf,
  format: EventFormat,
  uploader: UploaderKind,
  status: Option<CloseStatus>,
  failure: Option<FailureKind>,
  events: usize,
  written: u64,
  bytes: u64,
  duration_ms: u128,
}

/// Parse newline-delimited JSON build events, skipping blank lines.
fn read_events(path: &Path) -> Result<Vec<BuildEvent>> {
  let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
  content
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .map(|(n, line)| {
      serde_json::from_str(line).with_context(|| format!("Invalid build event at {}:{}", path.display(), n + 1))
    })
    .collect()
}

fn build_uploader(options: &ReplayOptions) -> Result<Arc<dyn ArtifactUploader>> {
  match options.uploader {
    UploaderKind::Local => {
      let base = std::env::current_dir().context("Failed to determine current directory")?;
      Ok(Arc::new(LocalFilesUploader::new(base)))
    }
    UploaderKind::Store => {
      let Some(root) = &options.store_dir else {
        bail!("--store-dir is required with --uploader store");
      };
      let mut config = StoreConfig::new(root);
      config.timeout = options.upload_timeout;
      Ok(Arc::new(StoreUploader::new(config)))
    }
  }
}

/// Execute the replay command.
///
/// Prints a summary of what was written. A stream that could not be written
/// completely is reported as an error.
pub fn cmd_replay(options: &ReplayOptions, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let events = read_events(&options.events)?;
  debug!(count = events.len(), path = %options.events.display(), "loaded build events");

  let uploader = build_uploader(options)?;
  let mut config = TransportConfig::from_env()
    .with_name("replay")
    .with_encode(EncodeOptions {
      format: options.format,
      path_conversion: options.path_conversion,
    });
  if let Some(interval) = options.flush_interval {
    config = config.with_flush_interval(interval);
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let (outcome, stats) = rt.block_on(async {
    let transport = EventTransport::create_file(&options.out, uploader, config)
      .await
      .with_context(|| format!("Failed to create {}", options.out.display()))?;
    for event in &events {
      transport.send(event.clone());
    }
    let outcome = transport.close().await;
    Ok::<_, anyhow::Error>((outcome, transport.stats()))
  })?;

  let summary = ReplaySummary {
    output: options.out.clone(),
    format: options.format,
    uploader: options.uploader,
    status: outcome.as_ref().ok().copied(),
    failure: outcome.as_ref().err().map(|e| e.kind()),
    events: events.len(),
    written: stats.written,
    bytes: stats.bytes_written,
    duration_ms: start.elapsed().as_millis(),
  };

  if output.is_json() {
    print_json(&summary)?;
  } else if outcome.is_ok() {
    println!();
    match summary.status {
      Some(CloseStatus::Cancelled) => print_warning("Event stream cancelled"),
      _ => print_success("Event stream written"),
    }
    print_stat("Output", &summary.output.display().to_string());
    print_stat("Format", summary.format.as_str());
    print_stat("Events", &format!("{}/{}", summary.written, summary.events));
    print_stat("Size", &format_bytes(summary.bytes));
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  match outcome {
    Ok(status) => {
      info!(?status, path = %options.out.display(), "replay finished");
      Ok(())
    }
    Err(err) => bail!(
      "event stream incomplete: {} ({} of {} events written)",
      err,
      stats.written,
      events.len()
    ),
  }
}
