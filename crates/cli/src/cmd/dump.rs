use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use bes_lib::encode::EventFormat;
use bes_lib::event::{BuildEvent, FileLocation};
use bes_lib::reader::decode_stream;

use crate::output::{OutputFormat, print_info, print_json, print_stat, print_warning, symbols};

#[derive(Serialize)]
struct DumpOutput<'a> {
  events: &'a [BuildEvent],
  truncated: bool,
  complete: bool,
}

fn describe_file_location(location: &FileLocation) -> String {
  match location {
    FileLocation::Path(path) => path.display().to_string(),
    FileLocation::Uri(uri) => uri.clone(),
    FileLocation::Contents(contents) => format!("<{} bytes inline>", contents.len()),
  }
}

pub fn cmd_dump(stream: &Path, format: EventFormat, output: OutputFormat) -> Result<()> {
  let bytes = std::fs::read(stream).with_context(|| format!("Failed to read {}", stream.display()))?;
  let decoded = decode_stream(&bytes, format).with_context(|| format!("Failed to decode {}", stream.display()))?;

  if output.is_json() {
    return print_json(&DumpOutput {
      events: &decoded.events,
      truncated: decoded.truncated,
      complete: decoded.is_complete(),
    });
  }

  for (index, event) in decoded.events.iter().enumerate() {
    let marker = if event.last_message { " (last)" } else { "" };
    println!("{:>4} {} {}{}", index, symbols::ARROW, event.id, marker);
    for file in event.files() {
      println!("       {} {}", file.name, describe_file_location(&file.location));
    }
  }

  println!();
  print_stat("Events", &decoded.events.len().to_string());
  if decoded.truncated {
    print_warning("Stream ends with a truncated record");
  } else if !decoded.is_complete() {
    print_info("Stream has no final event");
  }

  Ok(())
}
