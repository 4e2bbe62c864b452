//! Reading event streams back.
//!
//! A stream that ends part-way through a record is still readable: the partial
//! tail is reported as [`DecodedStream::truncated`] and every complete record
//! before it is returned.

use thiserror::Error;

use crate::encode::EventFormat;
use crate::encode::frame::{Frame, read_frame};
use crate::event::BuildEvent;

#[derive(Debug, Error)]
pub enum DecodeError {
  /// A complete record that is not a valid event.
  #[error("record {index} is corrupt: {message}")]
  Corrupt { index: usize, message: String },

  /// A length prefix that cannot be read.
  #[error("record {index} has a malformed length prefix")]
  Malformed { index: usize },

  #[error("{0} streams cannot be decoded")]
  Unsupported(EventFormat),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DecodedStream {
  pub events: Vec<BuildEvent>,
  /// The stream ended inside a record, which was skipped.
  pub truncated: bool,
}

impl DecodedStream {
  /// True if the last event read is marked as the final one.
  pub fn is_complete(&self) -> bool {
    !self.truncated && self.events.last().is_some_and(|event| event.last_message)
  }
}

pub fn decode_stream(bytes: &[u8], format: EventFormat) -> Result<DecodedStream, DecodeError> {
  match format {
    EventFormat::Binary => decode_binary(bytes),
    EventFormat::Json => decode_json(bytes),
    EventFormat::Text => Err(DecodeError::Unsupported(format)),
  }
}

fn parse(index: usize, record: &[u8]) -> Result<BuildEvent, DecodeError> {
  serde_json::from_slice(record).map_err(|e| DecodeError::Corrupt {
    index,
    message: e.to_string(),
  })
}

fn decode_binary(mut bytes: &[u8]) -> Result<DecodedStream, DecodeError> {
  let mut stream = DecodedStream::default();
  while !bytes.is_empty() {
    let index = stream.events.len();
    match read_frame(bytes) {
      Frame::Complete { payload, consumed } => {
        stream.events.push(parse(index, payload)?);
        bytes = &bytes[consumed..];
      }
      Frame::Truncated => {
        stream.truncated = true;
        break;
      }
      Frame::Malformed => return Err(DecodeError::Malformed { index }),
    }
  }
  Ok(stream)
}

fn decode_json(bytes: &[u8]) -> Result<DecodedStream, DecodeError> {
  let mut stream = DecodedStream::default();
  let mut lines = bytes.split(|b| *b == b'\n').peekable();
  while let Some(line) = lines.next() {
    if lines.peek().is_none() {
      // No trailing newline: the record was cut short.
      stream.truncated = !line.is_empty();
      break;
    }
    if line.iter().all(u8::is_ascii_whitespace) {
      continue;
    }
    let index = stream.events.len();
    stream.events.push(parse(index, line)?);
  }
  Ok(stream)
}
