//! # Frame Codec
//!
//! Decoding and encoding of frames for every supported dialect.
//!
//! A single [`FrameCodec`] value carries the negotiated [`Flavor`] and dispatches
//! on it, so each dialect grammar lives in exactly one match arm.
//!
//! ## Decode Contract
//! [`FrameCodec::decode`] either consumes exactly one complete frame from the
//! front of the buffer, reports [`DecodeResult::NeedMoreData`] (leaving any
//! partial frame in place), or reports a protocol violation. Hybi-00 noise in
//! front of a start marker is the only input ever discarded.
//!
//! ## tokio-util
//! The codec also implements [`Decoder`] and [`Encoder`], so a stream that has
//! already completed its handshake can be wrapped in `Framed`.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_FRAME_SIZE;
use crate::core::frame::{apply_mask, Frame, Opcode, Payload};
use crate::error::{ProtocolError, Result};

const HYBI00_START: u8 = 0x00;
const HYBI00_END: u8 = 0xff;

const FIN_BIT: u8 = 0x80;
const RSV_BITS: u8 = 0x70;
const OPCODE_MASK: u8 = 0x0f;
const MASK_BIT: u8 = 0x80;
const LEN_MASK: u8 = 0x7f;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// Dialect negotiated during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Flavor {
    Hybi00,
    Hybi07,
    Hybi10,
    Rfc6455,
    #[default]
    Unknown,
}

impl Flavor {
    /// Map a `Sec-WebSocket-Version` header value.
    pub fn from_version(version: &str) -> Option<Self> {
        match version {
            "7" => Some(Flavor::Hybi07),
            "8" => Some(Flavor::Hybi10),
            "13" => Some(Flavor::Rfc6455),
            _ => None,
        }
    }

    /// Whether the dialect uses the binary length-prefixed frame grammar.
    pub fn is_binary_framed(self) -> bool {
        matches!(self, Flavor::Hybi07 | Flavor::Hybi10 | Flavor::Rfc6455)
    }

    pub fn name(self) -> &'static str {
        match self {
            Flavor::Hybi00 => "hybi-00",
            Flavor::Hybi07 => "hybi-07",
            Flavor::Hybi10 => "hybi-10",
            Flavor::Rfc6455 => "rfc6455",
            Flavor::Unknown => "unknown",
        }
    }
}

/// Outcome of one decode attempt.
#[derive(Debug)]
pub enum DecodeResult {
    /// The buffer holds no complete frame; nothing of a partial frame was consumed.
    NeedMoreData,
    /// One frame was consumed from the front of the buffer.
    Decoded(Frame),
    /// The buffer violates the frame grammar. The connection must be closed.
    ProtocolError(ProtocolError),
}

/// Flavor-dispatched frame decoder/encoder.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    flavor: Flavor,
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Sets the largest payload accepted before the frame is rejected.
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Attempt to decode one frame from the front of `buf`.
    pub fn decode(&self, buf: &mut BytesMut) -> DecodeResult {
        match self.flavor {
            Flavor::Hybi00 => decode_hybi00(buf, self.max_frame_size),
            Flavor::Hybi07 | Flavor::Hybi10 | Flavor::Rfc6455 => {
                decode_hybi07(buf, self.max_frame_size)
            }
            Flavor::Unknown => DecodeResult::ProtocolError(ProtocolError::UnknownFlavor),
        }
    }

    /// Decode every complete frame currently buffered.
    pub fn decode_all(&self, buf: &mut BytesMut) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        loop {
            match self.decode(buf) {
                DecodeResult::NeedMoreData => return Ok(frames),
                DecodeResult::Decoded(frame) => frames.push(frame),
                DecodeResult::ProtocolError(err) => return Err(err),
            }
        }
    }

    /// Encode a frame for sending to the client.
    ///
    /// Hybi-00 has no control-frame grammar, so only `Normal` frames encode there.
    pub fn encode(&self, frame: &Frame, dst: &mut BytesMut) -> Result<()> {
        match self.flavor {
            Flavor::Hybi00 => match frame.opcode {
                Opcode::Normal => {
                    encode_hybi00(&frame.payload, dst);
                    Ok(())
                }
                other => Err(ProtocolError::UnknownOpcode(other.nibble())),
            },
            Flavor::Hybi07 | Flavor::Hybi10 | Flavor::Rfc6455 => {
                encode_hybi07(frame.opcode.nibble(), &frame.payload, dst);
                Ok(())
            }
            Flavor::Unknown => Err(ProtocolError::UnknownFlavor),
        }
    }

    /// Encode an application payload, choosing text or binary framing from its kind.
    pub fn encode_payload(&self, payload: &Payload, dst: &mut BytesMut) -> Result<()> {
        match self.flavor {
            Flavor::Hybi00 => {
                encode_hybi00(payload.as_bytes(), dst);
                Ok(())
            }
            Flavor::Hybi07 | Flavor::Hybi10 | Flavor::Rfc6455 => {
                encode_hybi07(payload.opcode_nibble(), payload.as_bytes(), dst);
                Ok(())
            }
            Flavor::Unknown => Err(ProtocolError::UnknownFlavor),
        }
    }
}

fn decode_hybi00(buf: &mut BytesMut, max_frame_size: usize) -> DecodeResult {
    let Some(start) = buf.iter().position(|&b| b == HYBI00_START) else {
        // Everything buffered is noise.
        buf.clear();
        return DecodeResult::NeedMoreData;
    };
    buf.advance(start);

    match buf[1..].iter().position(|&b| b == HYBI00_END) {
        Some(len) if len > max_frame_size => {
            DecodeResult::ProtocolError(ProtocolError::OversizedFrame {
                size: len as u64,
                max: max_frame_size,
            })
        }
        Some(len) => {
            buf.advance(1);
            let payload = buf.split_to(len).freeze();
            buf.advance(1);
            DecodeResult::Decoded(Frame::normal(payload))
        }
        None if buf.len() - 1 > max_frame_size => {
            DecodeResult::ProtocolError(ProtocolError::OversizedFrame {
                size: (buf.len() - 1) as u64,
                max: max_frame_size,
            })
        }
        None => DecodeResult::NeedMoreData,
    }
}

fn decode_hybi07(buf: &mut BytesMut, max_frame_size: usize) -> DecodeResult {
    if buf.len() < 2 {
        return DecodeResult::NeedMoreData;
    }

    let first = buf[0];
    let second = buf[1];

    // FIN is ignored: fragments are delivered independently.
    if first & RSV_BITS != 0 {
        return DecodeResult::ProtocolError(ProtocolError::ReservedBits(first & RSV_BITS));
    }
    let Some(opcode) = Opcode::from_nibble(first & OPCODE_MASK) else {
        return DecodeResult::ProtocolError(ProtocolError::UnknownOpcode(first & OPCODE_MASK));
    };

    let masked = second & MASK_BIT != 0;
    let (length, mut offset) = match second & LEN_MASK {
        LEN_16 => {
            if buf.len() < 4 {
                return DecodeResult::NeedMoreData;
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
        }
        LEN_64 => {
            if buf.len() < 10 {
                return DecodeResult::NeedMoreData;
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(raw), 10)
        }
        literal => (u64::from(literal), 2),
    };

    if length > max_frame_size as u64 {
        return DecodeResult::ProtocolError(ProtocolError::OversizedFrame {
            size: length,
            max: max_frame_size,
        });
    }
    // Bounded by max_frame_size above.
    let length = length as usize;

    let mask_key = if masked {
        if buf.len() < offset + 4 {
            return DecodeResult::NeedMoreData;
        }
        let key = [
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ];
        offset += 4;
        Some(key)
    } else {
        None
    };

    if buf.len() < offset + length {
        return DecodeResult::NeedMoreData;
    }

    buf.advance(offset);
    let mut payload = buf.split_to(length);
    if let Some(key) = mask_key {
        apply_mask(&mut payload, key);
    }

    DecodeResult::Decoded(Frame {
        opcode,
        payload: payload.freeze(),
        masked,
        mask_key,
    })
}

/// Write `0x00 <payload> 0xFF`. The payload must not contain `0xFF`.
pub fn encode_hybi00(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(payload.len() + 2);
    dst.put_u8(HYBI00_START);
    dst.put_slice(payload);
    dst.put_u8(HYBI00_END);
}

/// Write an unmasked, final Hybi-07+ frame using the shortest length encoding.
pub fn encode_hybi07(opcode: u8, payload: &[u8], dst: &mut BytesMut) {
    let len = payload.len();
    dst.reserve(len + 10);
    dst.put_u8(FIN_BIT | (opcode & OPCODE_MASK));
    if len < LEN_16 as usize {
        dst.put_u8(len as u8);
    } else if len <= u16::MAX as usize {
        dst.put_u8(LEN_16);
        dst.put_u16(len as u16);
    } else {
        dst.put_u8(LEN_64);
        dst.put_u64(len as u64);
    }
    dst.put_slice(payload);
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match FrameCodec::decode(self, src) {
            DecodeResult::NeedMoreData => Ok(None),
            DecodeResult::Decoded(frame) => Ok(Some(frame)),
            DecodeResult::ProtocolError(err) => Err(err),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        FrameCodec::encode(self, &frame, dst)
    }
}

impl Encoder<Payload> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: Payload, dst: &mut BytesMut) -> Result<()> {
        self.encode_payload(&payload, dst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn masked_frame(first: u8, payload: &[u8], key: [u8; 4]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(first);
        buf.put_u8(MASK_BIT | payload.len() as u8);
        buf.put_slice(&key);
        let mut body = payload.to_vec();
        apply_mask(&mut body, key);
        buf.put_slice(&body);
        buf
    }

    #[test]
    fn test_hybi00_single_frame() {
        let codec = FrameCodec::new(Flavor::Hybi00);
        let mut buf = BytesMut::from(&b"\x00hello\xff"[..]);
        match codec.decode(&mut buf) {
            DecodeResult::Decoded(frame) => {
                assert_eq!(frame.opcode, Opcode::Normal);
                assert_eq!(&frame.payload[..], b"hello");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_hybi00_noise_discarded() {
        let codec = FrameCodec::new(Flavor::Hybi00);
        let mut buf = BytesMut::from(&b"junk\x00a\xff\x00b"[..]);
        let frames = codec.decode_all(&mut buf).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], b"a");
        // Partial frame retained from its start marker.
        assert_eq!(&buf[..], b"\x00b");
    }

    #[test]
    fn test_hybi00_all_noise_cleared() {
        let codec = FrameCodec::new(Flavor::Hybi00);
        let mut buf = BytesMut::from(&b"no markers here"[..]);
        assert!(matches!(codec.decode(&mut buf), DecodeResult::NeedMoreData));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_hybi00_oversized_unterminated() {
        let codec = FrameCodec::new(Flavor::Hybi00).with_max_frame_size(4);
        let mut buf = BytesMut::from(&b"\x0012345"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            DecodeResult::ProtocolError(ProtocolError::OversizedFrame { .. })
        ));

        let mut buf = BytesMut::from(&b"\x0012345\xff"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            DecodeResult::ProtocolError(ProtocolError::OversizedFrame { size: 5, max: 4 })
        ));
    }

    #[test]
    fn test_hybi07_masked_text() {
        let codec = FrameCodec::new(Flavor::Rfc6455);
        let mut buf = masked_frame(0x81, b"Hello", [0x37, 0xfa, 0x21, 0x3d]);
        match codec.decode(&mut buf) {
            DecodeResult::Decoded(frame) => {
                assert_eq!(frame.opcode, Opcode::Normal);
                assert!(frame.masked);
                assert_eq!(frame.mask_key, Some([0x37, 0xfa, 0x21, 0x3d]));
                assert_eq!(&frame.payload[..], b"Hello");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_hybi07_partial_consumes_nothing() {
        let codec = FrameCodec::new(Flavor::Hybi10);
        let full = masked_frame(0x82, b"payload", [1, 2, 3, 4]);
        for cut in 0..full.len() {
            let mut buf = BytesMut::from(&full[..cut]);
            assert!(matches!(codec.decode(&mut buf), DecodeResult::NeedMoreData));
            assert_eq!(buf.len(), cut);
        }
    }

    #[test]
    fn test_hybi07_reserved_bits_rejected() {
        let codec = FrameCodec::new(Flavor::Rfc6455);
        for rsv in [0x10u8, 0x20, 0x40, 0x70] {
            let mut buf = BytesMut::from(&[0x80 | rsv | 0x1, 0x00][..]);
            assert!(matches!(
                codec.decode(&mut buf),
                DecodeResult::ProtocolError(ProtocolError::ReservedBits(_))
            ));
        }
    }

    #[test]
    fn test_hybi07_unknown_opcodes_rejected() {
        let codec = FrameCodec::new(Flavor::Hybi07);
        for nibble in (0x3u8..=0x7).chain(0xb..=0xf) {
            let mut buf = BytesMut::from(&[0x80 | nibble, 0x00][..]);
            match codec.decode(&mut buf) {
                DecodeResult::ProtocolError(ProtocolError::UnknownOpcode(n)) => {
                    assert_eq!(n, nibble)
                }
                other => panic!("nibble {nibble:#x}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_hybi07_oversized_rejected_from_header() {
        let codec = FrameCodec::new(Flavor::Rfc6455).with_max_frame_size(1024);
        let mut buf = BytesMut::new();
        buf.put_u8(0x82);
        buf.put_u8(LEN_64);
        buf.put_u64(u64::MAX);
        assert!(matches!(
            codec.decode(&mut buf),
            DecodeResult::ProtocolError(ProtocolError::OversizedFrame { size: u64::MAX, max: 1024 })
        ));
    }

    #[test]
    fn test_hybi07_close_frame() {
        let codec = FrameCodec::new(Flavor::Rfc6455);
        let mut payload = vec![0x03, 0xe9];
        payload.extend_from_slice(b"bye");
        let mut buf = masked_frame(0x88, &payload, [9, 8, 7, 6]);
        match codec.decode(&mut buf) {
            DecodeResult::Decoded(frame) => {
                assert_eq!(frame.opcode, Opcode::Close);
                let reason = frame.close_reason();
                assert_eq!(reason.code, 1001);
                assert_eq!(reason.reason, "bye");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_length_encoding_boundaries() {
        let cases = [(125usize, 2usize), (126, 4), (65535, 4), (65536, 10)];
        for (len, header) in cases {
            let mut buf = BytesMut::new();
            encode_hybi07(0x2, &vec![0xab; len], &mut buf);
            assert_eq!(buf.len(), header + len, "length {len}");
            assert_eq!(buf[0], 0x82);
            let codec = FrameCodec::new(Flavor::Rfc6455);
            match codec.decode(&mut buf) {
                DecodeResult::Decoded(frame) => assert_eq!(frame.payload.len(), len),
                other => panic!("length {len}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_non_minimal_length_still_decodes() {
        let codec = FrameCodec::new(Flavor::Rfc6455);
        let mut buf = BytesMut::new();
        buf.put_u8(0x82);
        buf.put_u8(LEN_64);
        buf.put_u64(3);
        buf.put_slice(b"abc");
        let frames = codec.decode_all(&mut buf).unwrap();
        assert_eq!(&frames[0].payload[..], b"abc");
    }

    #[test]
    fn test_unknown_flavor_has_no_grammar() {
        let codec = FrameCodec::new(Flavor::Unknown);
        let mut buf = BytesMut::from(&b"\x00x\xff"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            DecodeResult::ProtocolError(ProtocolError::UnknownFlavor)
        ));
        assert!(codec.encode(&Frame::normal("x"), &mut buf).is_err());
    }

    #[test]
    fn test_hybi00_rejects_control_encode() {
        let codec = FrameCodec::new(Flavor::Hybi00);
        let mut dst = BytesMut::new();
        assert!(codec.encode(&Frame::pong("x"), &mut dst).is_err());
        assert!(dst.is_empty());
    }

    #[test]
    fn test_encode_payload_dwim() {
        let codec = FrameCodec::new(Flavor::Rfc6455);
        let mut dst = BytesMut::new();
        codec.encode_payload(&Payload::from("text"), &mut dst).unwrap();
        assert_eq!(dst[0], 0x81);
        dst.clear();
        codec
            .encode_payload(&Payload::from(vec![0u8, 1]), &mut dst)
            .unwrap();
        assert_eq!(dst[0], 0x82);
    }

    #[test]
    fn test_flavor_versions() {
        assert_eq!(Flavor::from_version("7"), Some(Flavor::Hybi07));
        assert_eq!(Flavor::from_version("8"), Some(Flavor::Hybi10));
        assert_eq!(Flavor::from_version("13"), Some(Flavor::Rfc6455));
        assert_eq!(Flavor::from_version("12"), None);
        assert!(!Flavor::Hybi00.is_binary_framed());
        assert!(Flavor::Hybi10.is_binary_framed());
    }
}
