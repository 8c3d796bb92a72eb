// src/core/cache/protocol.rs

//! A minimal RESP2 frame codec for the remote key/value cache client.
//!
//! Only the frame types the client actually exchanges are implemented:
//! simple strings, errors, integers, bulk strings, nulls and arrays.

use crate::core::errors::AgentError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The CRLF sequence terminating lines in RESP.
const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

/// Upper bound on a single bulk string, to reject malformed length prefixes.
const MAX_BULK_STRING_SIZE: usize = 16 * 1024 * 1024;

/// An enum representing a single frame in the RESP protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// Builds a command array from string arguments.
    pub fn command(args: &[&str]) -> Frame {
        Frame::Array(
            args.iter()
                .map(|a| Frame::BulkString(Bytes::copy_from_slice(a.as_bytes())))
                .collect(),
        )
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `Frame`s.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = AgentError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Frame::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            Frame::Error(s) => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            Frame::Integer(i) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(i.to_string().as_bytes());
                dst.extend_from_slice(CRLF);
            }
            Frame::BulkString(b) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(b.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            Frame::Null => {
                dst.extend_from_slice(b"$-1\r\n");
            }
            Frame::Array(arr) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(arr.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                for frame in arr {
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = AgentError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        let mut pos = 0usize;
        match parse_frame(src, &mut pos)? {
            Some(frame) => {
                src.advance(pos);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

/// Parses one frame starting at `*pos`, advancing it past the frame on
/// success. Returns `None` when the buffer does not yet hold a full frame.
fn parse_frame(buf: &[u8], pos: &mut usize) -> Result<Option<Frame>, AgentError> {
    let Some(line) = read_line(buf, pos) else {
        return Ok(None);
    };
    if line.is_empty() {
        return Err(AgentError::Protocol("empty frame line".to_string()));
    }

    let (kind, rest) = (line[0], &line[1..]);
    let text = std::str::from_utf8(rest)
        .map_err(|_| AgentError::Protocol("non-UTF8 frame header".to_string()))?;

    match kind {
        b'+' => Ok(Some(Frame::SimpleString(text.to_string()))),
        b'-' => Ok(Some(Frame::Error(text.to_string()))),
        b':' => {
            let value: i64 = text
                .parse()
                .map_err(|_| AgentError::Protocol(format!("invalid integer '{text}'")))?;
            Ok(Some(Frame::Integer(value)))
        }
        b'$' => {
            let len: i64 = text
                .parse()
                .map_err(|_| AgentError::Protocol(format!("invalid bulk length '{text}'")))?;
            if len < 0 {
                return Ok(Some(Frame::Null));
            }
            let len = len as usize;
            if len > MAX_BULK_STRING_SIZE {
                return Err(AgentError::Protocol(format!(
                    "bulk string of {len} bytes exceeds limit"
                )));
            }
            if buf.len() < *pos + len + CRLF_LEN {
                return Ok(None);
            }
            let data = Bytes::copy_from_slice(&buf[*pos..*pos + len]);
            *pos += len + CRLF_LEN;
            Ok(Some(Frame::BulkString(data)))
        }
        b'*' => {
            let count: i64 = text
                .parse()
                .map_err(|_| AgentError::Protocol(format!("invalid array length '{text}'")))?;
            if count < 0 {
                return Ok(Some(Frame::Null));
            }
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                match parse_frame(buf, pos)? {
                    Some(frame) => items.push(frame),
                    None => return Ok(None),
                }
            }
            Ok(Some(Frame::Array(items)))
        }
        other => Err(AgentError::Protocol(format!(
            "unknown frame type byte {other:#04x}"
        ))),
    }
}

/// Reads one CRLF-terminated line starting at `*pos`, excluding the CRLF.
fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let slice = &buf[*pos..];
    let end = slice.windows(CRLF_LEN).position(|w| w == CRLF)?;
    let line = &slice[..end];
    *pos += end + CRLF_LEN;
    Some(line)
}
