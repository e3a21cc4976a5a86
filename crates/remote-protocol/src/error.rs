//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Payload exceeds what the 32-bit length field can describe
    #[error("payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Exit frame whose payload is not a 4-byte status code
    #[error("malformed exit frame: payload is {0} bytes, expected 4")]
    MalformedExit(usize),

    /// Stream ended inside a frame header or payload
    #[error("connection closed mid-frame")]
    Truncated,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
