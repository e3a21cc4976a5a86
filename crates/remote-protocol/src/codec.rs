//! Tokio codec for framed protocol messages

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{Frame, FrameHeader};

/// Largest payload the 32-bit length field can describe
const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Header of the frame currently being decoded (if any)
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Try to decode a header if we don't have one
            let header = match self.pending_header.take() {
                Some(h) => h,
                None => match FrameHeader::decode(src) {
                    Some(h) => h,
                    None => return Ok(None), // Need more data
                },
            };

            // Check if we have enough data for the payload
            let payload_len = header.payload_length as usize;
            if src.len() < payload_len {
                // Save header and wait for more data
                self.pending_header = Some(header);
                return Ok(None);
            }

            let payload = src.split_to(payload_len).freeze();

            // Unknown kinds are dropped and decoding continues
            match Frame::from_wire(header, payload)? {
                Some(frame) => return Ok(Some(frame)),
                None => continue,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // End-of-file is clean only at a header boundary; a
                // partial header or a header awaiting its payload means
                // the peer died mid-frame.
                if self.pending_header.is_some() || !src.is_empty() {
                    Err(ProtocolError::Truncated)
                } else {
                    Ok(None)
                }
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload_len = frame.payload_len();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        frame.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HEADER_SIZE;
    use bytes::Bytes;

    fn encode_all(frames: &[Frame]) -> BytesMut {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for frame in frames {
            codec.encode(frame.clone(), &mut buf).unwrap();
        }
        buf
    }

    #[test]
    fn test_codec_roundtrip() {
        let frames = vec![
            Frame::Stdout(Bytes::from_static(b"hello\n")),
            Frame::Stderr(Bytes::from_static(b"warning\n")),
            Frame::Exit(42),
        ];

        let mut buf = encode_all(&frames);
        let mut codec = FrameCodec::new();

        for expected in &frames {
            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(&decoded, expected);
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = FrameCodec::new();
        let full_buf = encode_all(&[Frame::Stdout(Bytes::from_static(b"payload"))]);

        // Feed one byte at a time; the frame appears only once complete
        let mut partial = BytesMut::new();
        for (i, byte) in full_buf.iter().enumerate() {
            partial.extend_from_slice(&[*byte]);
            let decoded = codec.decode(&mut partial).unwrap();
            if i + 1 < full_buf.len() {
                assert!(decoded.is_none());
            } else {
                assert_eq!(decoded.unwrap(), Frame::Stdout(Bytes::from_static(b"payload")));
            }
        }
    }

    #[test]
    fn test_zero_length_payload() {
        let mut buf = encode_all(&[Frame::Stdout(Bytes::new()), Frame::Exit(0)]);
        assert_eq!(&buf[..HEADER_SIZE], &[0x01, 0, 0, 0, 0]);

        let mut codec = FrameCodec::new();
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            Frame::Stdout(Bytes::new())
        );
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Frame::Exit(0));
    }

    #[test]
    fn test_unknown_kind_skipped() {
        let mut buf = BytesMut::new();
        // Unknown kind 0x7F with a 3-byte payload, then a normal frame
        buf.extend_from_slice(&[0x7F, 0, 0, 0, 3, 1, 2, 3]);
        FrameCodec::new()
            .encode(Frame::Exit(7), &mut buf)
            .unwrap();

        let mut codec = FrameCodec::new();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Frame::Exit(7));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_unknown_kind_split_across_reads() {
        let mut codec = FrameCodec::new();

        // Header of an unknown frame arrives alone
        let mut buf = BytesMut::from(&[0x7F, 0, 0, 0, 2][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // Payload plus a trailing known frame
        buf.extend_from_slice(&[9, 9]);
        codec.encode(Frame::Exit(0), &mut buf).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Frame::Exit(0));
    }

    #[test]
    fn test_eof_at_header_boundary_is_clean() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_eof_mid_header_is_error() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x01, 0, 0][..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(ProtocolError::Truncated)
        ));
    }

    #[test]
    fn test_eof_mid_payload_is_error() {
        let mut codec = FrameCodec::new();
        // Header promises 10 bytes; only 4 ever arrive
        let mut buf = BytesMut::from(&[0x01, 0, 0, 0, 10, b'a', b'b', b'c', b'd'][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(ProtocolError::Truncated)
        ));
    }

    #[test]
    fn test_malformed_exit_is_error() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x03, 0, 0, 0, 2, 0, 1][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::MalformedExit(2))
        ));
    }
}
