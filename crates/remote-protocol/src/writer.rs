//! Shared frame writer
//!
//! Many command tasks emit frames onto one transport. The writer stages
//! each frame into a single buffer and writes it under a mutex, so the
//! byte sequence on the wire is always an interleaving of whole frames.

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::codec::Encoder;

use crate::codec::FrameCodec;
use crate::error::ProtocolError;
use crate::frame::{Frame, HEADER_SIZE};

/// Serializes concurrent frame producers onto one transport
pub struct FrameWriter<W> {
    inner: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    /// Wrap a transport write half
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Encode and write one frame.
    ///
    /// Header and payload go out in a single locked write, so frames from
    /// concurrent callers never splice. Write errors propagate; there is
    /// no retransmission.
    pub async fn send(&self, frame: Frame) -> Result<(), ProtocolError> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + frame.payload_len());
        FrameCodec::new().encode(frame, &mut buf)?;

        let mut writer = self.inner.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }
}
