//! Frame types and header encoding/decoding
//!
//! The wire format uses a 5-byte header:
//! - kind: 1 byte
//! - payload_length: 4 bytes (u32, big-endian)
//!
//! followed by the payload. Exit frames carry a 4-byte big-endian status
//! code as their payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 5;

/// Kind byte for captured standard output
pub const KIND_STDOUT: u8 = 0x01;
/// Kind byte for standard error
pub const KIND_STDERR: u8 = 0x02;
/// Kind byte for a command's final status
pub const KIND_EXIT: u8 = 0x03;

/// Payload size of an exit frame
pub const EXIT_PAYLOAD_SIZE: usize = 4;

/// Exit code reported when a remote session could not be established
pub const EXIT_NO_SESSION: u32 = 255;
/// Exit code for remote failures that carry no structured exit status
pub const EXIT_FAILURE: u32 = 1;

/// One typed, length-prefixed record on the local wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Captured output of a remote command
    Stdout(Bytes),
    /// Daemon diagnostics or remote error text
    Stderr(Bytes),
    /// Final status of a remote command; at most one per command
    Exit(u32),
}

impl Frame {
    /// Wire kind byte for this frame
    pub fn kind(&self) -> u8 {
        match self {
            Frame::Stdout(_) => KIND_STDOUT,
            Frame::Stderr(_) => KIND_STDERR,
            Frame::Exit(_) => KIND_EXIT,
        }
    }

    /// Payload length on the wire
    pub fn payload_len(&self) -> usize {
        match self {
            Frame::Stdout(data) | Frame::Stderr(data) => data.len(),
            Frame::Exit(_) => EXIT_PAYLOAD_SIZE,
        }
    }

    /// Encode header and payload into `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        FrameHeader::new(self.kind(), self.payload_len() as u32).encode(dst);
        match self {
            Frame::Stdout(data) | Frame::Stderr(data) => dst.extend_from_slice(data),
            Frame::Exit(code) => dst.put_u32(*code),
        }
    }

    /// Build a frame from a decoded header and its payload.
    ///
    /// Returns `Ok(None)` for unknown kinds so callers can skip them
    /// (forward compatibility). An exit frame whose payload is not
    /// exactly 4 bytes is an error.
    pub fn from_wire(header: FrameHeader, mut payload: Bytes) -> Result<Option<Self>, ProtocolError> {
        match header.kind {
            KIND_STDOUT => Ok(Some(Frame::Stdout(payload))),
            KIND_STDERR => Ok(Some(Frame::Stderr(payload))),
            KIND_EXIT => {
                if payload.len() != EXIT_PAYLOAD_SIZE {
                    return Err(ProtocolError::MalformedExit(payload.len()));
                }
                Ok(Some(Frame::Exit(payload.get_u32())))
            }
            _ => Ok(None),
        }
    }
}

/// Frame header containing the kind byte and payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Kind of payload that follows
    pub kind: u8,
    /// Length of the payload in bytes
    pub payload_length: u32,
}

impl FrameHeader {
    /// Create a new frame header
    pub fn new(kind: u8, payload_length: u32) -> Self {
        Self {
            kind,
            payload_length,
        }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE + self.payload_length as usize);
        dst.put_u8(self.kind);
        dst.put_u32(self.payload_length);
    }

    /// Decode a header from a byte buffer.
    ///
    /// Returns `None` if there aren't enough bytes in the buffer. Any
    /// kind byte is accepted here; unknown kinds are resolved by the
    /// codec so their payloads can be skipped.
    pub fn decode(src: &mut BytesMut) -> Option<Self> {
        if src.len() < HEADER_SIZE {
            return None;
        }
        let kind = src.get_u8();
        let payload_length = src.get_u32();
        Some(Self {
            kind,
            payload_length,
        })
    }
}
