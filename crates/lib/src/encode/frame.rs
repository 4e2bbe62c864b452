//! Length-prefixed record framing for binary streams.
//!
//! Each record is a LEB128 varint holding the payload length, followed by the
//! payload bytes.

/// Longest varint a u64 can need.
const MAX_VARINT_LEN: usize = 10;

/// Outcome of reading one frame from the front of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
  /// A complete record and the number of bytes it occupied.
  Complete { payload: &'a [u8], consumed: usize },
  /// The buffer ends part-way through a record.
  Truncated,
  /// The length prefix is not a valid varint.
  Malformed,
}

pub fn write_varint(mut value: u64, out: &mut Vec<u8>) {
  loop {
    let byte = (value & 0x7f) as u8;
    value >>= 7;
    if value == 0 {
      out.push(byte);
      return;
    }
    out.push(byte | 0x80);
  }
}

/// Reads a varint, returning the value and its encoded length.
///
/// `None` means the buffer ended before the varint did.
fn read_varint(buf: &[u8]) -> Option<Result<(u64, usize), ()>> {
  let mut value: u64 = 0;
  for (i, byte) in buf.iter().enumerate() {
    if i >= MAX_VARINT_LEN {
      return Some(Err(()));
    }
    value |= u64::from(byte & 0x7f) << (7 * i);
    if byte & 0x80 == 0 {
      return Some(Ok((value, i + 1)));
    }
  }
  if buf.len() >= MAX_VARINT_LEN {
    return Some(Err(()));
  }
  None
}

/// Appends `payload` to `out` as one frame.
pub fn write_frame(payload: &[u8], out: &mut Vec<u8>) {
  write_varint(payload.len() as u64, out);
  out.extend_from_slice(payload);
}

pub fn read_frame(buf: &[u8]) -> Frame<'_> {
  let (len, header) = match read_varint(buf) {
    None => return Frame::Truncated,
    Some(Err(())) => return Frame::Malformed,
    Some(Ok(parsed)) => parsed,
  };
  let Ok(len) = usize::try_from(len) else {
    return Frame::Malformed;
  };
  let Some(end) = header.checked_add(len) else {
    return Frame::Malformed;
  };
  if buf.len() < end {
    return Frame::Truncated;
  }
  Frame::Complete {
    payload: &buf[header..end],
    consumed: end,
  }
}
