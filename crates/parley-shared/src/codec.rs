//! Length-prefixed JSON frame codec.
//!
//! Wire format: a 4-byte big-endian unsigned payload length, then exactly
//! that many bytes of JSON. Decoding is a scoped two-phase read: nothing is
//! consumed until the full prefix is buffered, and nothing past the prefix
//! is consumed until the full payload is buffered. A frame split across any
//! number of partial reads decodes byte-for-byte the same as an unsplit one.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::protocol::Frame;

/// Maximum accepted payload size. A length prefix above this is treated as
/// a corrupt stream rather than an allocation request.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const PREFIX_LEN: usize = 4;

/// Tokio codec framing the byte stream into [`Frame`] values.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if src.len() < PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&src[..PREFIX_LEN]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { len });
        }

        if src.len() < PREFIX_LEN + len {
            // Partial payload — leave everything buffered and wait.
            src.reserve(PREFIX_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(PREFIX_LEN);
        let payload = src.split_to(len);
        Ok(Some(serde_json::from_slice(&payload)?))
    }

    /// EOF with an empty buffer is a clean close between frames; EOF with
    /// bytes still pending means the peer died mid-frame.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::FrameTruncated),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload = serde_json::to_vec(&frame)?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { len: payload.len() });
        }

        dst.reserve(PREFIX_LEN + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChatMessage;

    fn encode(frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec.encode(frame, &mut buf).unwrap();
        buf
    }

    fn sample_frame() -> Frame {
        Frame::messages(&[ChatMessage {
            sender: "bob".into(),
            recipient: "ALL".into(),
            timestamp: 1000,
            body: "héllo 世界".into(),
        }])
    }

    #[test]
    fn test_roundtrip() {
        let mut buf = encode(sample_frame());
        let decoded = FrameCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, sample_frame());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_byte_at_a_time() {
        let wire = encode(sample_frame());
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();

        for (i, byte) in wire.iter().enumerate() {
            buf.put_u8(*byte);
            let result = codec.decode(&mut buf).unwrap();
            if i + 1 < wire.len() {
                assert!(result.is_none(), "decoded early at byte {i}");
            } else {
                assert_eq!(result.unwrap(), sample_frame());
            }
        }
    }

    #[test]
    fn test_decode_arbitrary_split_points() {
        let wire = encode(sample_frame());

        for split in 1..wire.len() {
            let mut codec = FrameCodec;
            let mut buf = BytesMut::from(&wire[..split]);
            assert!(codec.decode(&mut buf).unwrap().is_none());
            buf.extend_from_slice(&wire[split..]);
            assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), sample_frame());
        }
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut buf = encode(Frame::info("first"));
        buf.extend_from_slice(&encode(Frame::info("second")));

        let mut codec = FrameCodec;
        let a = codec.decode(&mut buf).unwrap().unwrap();
        let b = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(a.info.as_deref(), Some("first"));
        assert_eq!(b.info.as_deref(), Some("second"));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_eof_between_frames_is_clean() {
        let mut buf = BytesMut::new();
        assert!(FrameCodec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_eof_mid_frame_is_truncation() {
        let wire = encode(sample_frame());
        let mut buf = BytesMut::from(&wire[..wire.len() - 1]);
        assert!(matches!(
            FrameCodec.decode_eof(&mut buf),
            Err(ProtocolError::FrameTruncated)
        ));
    }

    #[test]
    fn test_oversized_prefix_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);
        buf.put_slice(b"xxxx");
        assert!(matches!(
            FrameCodec.decode(&mut buf),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }
}
