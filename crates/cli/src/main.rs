mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use bes_lib::encode::EventFormat;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{ReplayOptions, UploaderKind};
use crate::output::{OutputFormat, print_error};

/// bes - stream build events to ordered, durable event logs
#[derive(Parser)]
#[command(name = "bes")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format for command results
  #[arg(long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Stream recorded build events into an event log
  Replay {
    /// Newline-delimited JSON file with one build event per line
    events: PathBuf,

    /// Event log to write
    #[arg(short, long)]
    out: PathBuf,

    /// Event log format (binary, json or text)
    #[arg(short, long, default_value = "binary")]
    format: EventFormat,

    /// Longest time written events may stay unflushed (e.g. 250ms)
    #[arg(long)]
    flush_interval: Option<humantime::Duration>,

    /// How referenced artifacts are turned into stream references
    #[arg(long, value_enum, default_value_t)]
    uploader: UploaderKind,

    /// Store directory for the store uploader
    #[arg(long, required_if_eq("uploader", "store"))]
    store_dir: Option<PathBuf>,

    /// Deadline for uploading the files of one event
    #[arg(long, default_value = "60s")]
    upload_timeout: humantime::Duration,

    /// Write local artifact paths verbatim instead of uploading them
    #[arg(long)]
    no_path_conversion: bool,
  },

  /// Print the events in an event log
  Dump {
    /// Event log to read
    stream: PathBuf,

    /// Event log format (binary or json)
    #[arg(short, long, default_value = "binary")]
    format: EventFormat,
  },
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(err) = run(cli) {
    print_error(&format!("{:#}", err));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {
    Commands::Replay {
      events,
      out,
      format,
      flush_interval,
      uploader,
      store_dir,
      upload_timeout,
      no_path_conversion,
    } => cmd::cmd_replay(
      &ReplayOptions {
        events,
        out,
        format,
        flush_interval: flush_interval.map(Into::into),
        uploader,
        store_dir,
        upload_timeout: upload_timeout.into(),
        path_conversion: !no_path_conversion,
      },
      cli.output,
    ),
    Commands::Dump { stream, format } => cmd::cmd_dump(&stream, format, cli.output),
  }
}
