//! Frame encoding and decoding.
//!
//! # Frames
//! ```text
//! LengthPrefixedString: [u16 BE byte count][UTF-8 bytes]
//! FixedInt64:           [i64 BE, two's complement]
//! ```
//!
//! Slice decoders take a `&mut &[u8]` cursor and only advance it once a
//! whole frame is available; a short buffer is a `MalformedFrame`.
//! `FrameDecoder` is the streaming variant: bytes are appended as they
//! arrive from the socket and frames are handed out once complete.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::protocol::error::{BridgeError, Result};
use crate::protocol::{OP_DOWNLOAD, OP_UPLOAD};

/// Largest string a frame can carry, in encoded bytes.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

const LEN_PREFIX: usize = 2;
const INT64_LEN: usize = 8;

/// One self-delimited unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    LengthPrefixedString(String),
    FixedInt64(i64),
}

impl Frame {
    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Frame::LengthPrefixedString(s) => put_string(dst, s),
            Frame::FixedInt64(n) => {
                dst.put_i64(*n);
                Ok(())
            }
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::LengthPrefixedString(s) => LEN_PREFIX + s.len(),
            Frame::FixedInt64(_) => INT64_LEN,
        }
    }
}

/// Append a length-prefixed string, failing if it exceeds the u16 bound.
pub fn put_string(dst: &mut BytesMut, s: &str) -> Result<()> {
    let len = u16::try_from(s.len()).map_err(|_| BridgeError::EncodingOverflow {
        len: s.len(),
        max: MAX_STRING_LEN,
    })?;
    dst.reserve(LEN_PREFIX + s.len());
    dst.put_u16(len);
    dst.put_slice(s.as_bytes());
    Ok(())
}

pub fn encode_string(s: &str) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(LEN_PREFIX + s.len());
    put_string(&mut buf, s)?;
    Ok(buf.freeze())
}

pub fn encode_i64(n: i64) -> Bytes {
    Bytes::copy_from_slice(&n.to_be_bytes())
}

/// Decode a string frame from the front of `src`.
pub fn decode_string(src: &mut &[u8]) -> Result<String> {
    match parse_string(src)? {
        Some((s, consumed)) => {
            src.advance(consumed);
            Ok(s)
        }
        None => Err(BridgeError::MalformedFrame(format!(
            "string frame truncated: {} bytes available",
            src.len()
        ))),
    }
}

/// Decode an i64 frame from the front of `src`.
pub fn decode_i64(src: &mut &[u8]) -> Result<i64> {
    match parse_i64(src) {
        Some(n) => {
            src.advance(INT64_LEN);
            Ok(n)
        }
        None => Err(BridgeError::MalformedFrame(format!(
            "int64 frame needs {} bytes, {} available",
            INT64_LEN,
            src.len()
        ))),
    }
}

/// Returns `Ok(None)` while the frame is incomplete.
fn parse_string(src: &[u8]) -> Result<Option<(String, usize)>> {
    if src.len() < LEN_PREFIX {
        return Ok(None);
    }
    let len = u16::from_be_bytes([src[0], src[1]]) as usize;
    let end = LEN_PREFIX + len;
    if src.len() < end {
        return Ok(None);
    }
    let s = std::str::from_utf8(&src[LEN_PREFIX..end])
        .map_err(|e| BridgeError::MalformedFrame(format!("string frame is not UTF-8: {}", e)))?;
    Ok(Some((s.to_owned(), end)))
}

fn parse_i64(src: &[u8]) -> Option<i64> {
    let raw: [u8; INT64_LEN] = src.get(..INT64_LEN)?.try_into().ok()?;
    Some(i64::from_be_bytes(raw))
}

/// Header opening an upload: operation, filename, declared size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHeader {
    pub filename: String,
    pub size: i64,
}

pub fn encode_upload_header(filename: &str, size: i64) -> Result<BytesMut> {
    let frames = [
        Frame::LengthPrefixedString(OP_UPLOAD.to_string()),
        Frame::LengthPrefixedString(filename.to_string()),
        Frame::FixedInt64(size),
    ];
    encode_frames(&frames)
}

pub fn decode_upload_header(src: &mut &[u8]) -> Result<UploadHeader> {
    let mut cursor = *src;
    let op = decode_string(&mut cursor)?;
    if op != OP_UPLOAD {
        return Err(BridgeError::MalformedFrame(format!(
            "expected {} operation, got {:?}",
            OP_UPLOAD, op
        )));
    }
    let filename = decode_string(&mut cursor)?;
    let size = decode_i64(&mut cursor)?;
    *src = cursor;
    Ok(UploadHeader { filename, size })
}

pub fn encode_download_request(filename: &str) -> Result<BytesMut> {
    let frames = [
        Frame::LengthPrefixedString(OP_DOWNLOAD.to_string()),
        Frame::LengthPrefixedString(filename.to_string()),
    ];
    encode_frames(&frames)
}

fn encode_frames(frames: &[Frame]) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(frames.iter().map(Frame::encoded_len).sum());
    for frame in frames {
        frame.encode(&mut buf)?;
    }
    Ok(buf)
}

/// Reassembles frames from a byte stream that arrives in arbitrary pieces.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer to read socket bytes into.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet handed out as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn next_string(&mut self) -> Result<Option<String>> {
        match parse_string(&self.buf)? {
            Some((s, consumed)) => {
                self.buf.advance(consumed);
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    pub fn next_i64(&mut self) -> Option<i64> {
        let n = parse_i64(&self.buf)?;
        self.buf.advance(INT64_LEN);
        Some(n)
    }

    /// Take exactly `n` raw bytes once they are all buffered.
    pub fn take_exact(&mut self, n: usize) -> Option<Bytes> {
        if self.buf.len() < n {
            return None;
        }
        Some(self.buf.split_to(n).freeze())
    }
}
