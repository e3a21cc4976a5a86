//! remote-protocol: wire protocol between the client and the daemon
//!
//! This crate defines the length-prefixed binary frames the daemon emits
//! over the local socket, and the codec and shared writer used on both
//! ends of it.

pub mod codec;
pub mod error;
pub mod frame;
pub mod writer;

pub use codec::FrameCodec;
pub use error::ProtocolError;
pub use frame::{Frame, FrameHeader, EXIT_FAILURE, EXIT_NO_SESSION, HEADER_SIZE};
pub use writer::FrameWriter;
