//! Newline-delimited JSON framing.
//!
//! One frame per line. JSON never contains a raw newline outside strings
//! (where it is escaped), so the newline is an unambiguous delimiter.

use bytes::{BufMut, Bytes, BytesMut};
use treebus_core::frame::{self, Frame};
use treebus_core::FrameError;

pub const DELIMITER: u8 = b'\n';

/// Encode one frame, delimiter included.
pub fn encode_line(frame: &Frame) -> Result<Bytes, FrameError> {
    let body = frame::encode(frame)?;
    let mut buf = BytesMut::with_capacity(body.len() + 1);
    buf.put_slice(&body);
    buf.put_u8(DELIMITER);
    Ok(buf.freeze())
}

/// Decode one line, with or without its delimiter.
pub fn decode_line(line: &[u8]) -> Result<Frame, FrameError> {
    let body = line.strip_suffix(&[DELIMITER]).unwrap_or(line);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    frame::decode(body)
}
