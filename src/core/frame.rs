use bytes::{BufMut, Bytes, BytesMut};

use crate::error::constants;

/// Logical frame kind shared by every dialect.
///
/// Hybi-00 only ever produces [`Opcode::Normal`]. The RFC 6455 data opcodes
/// (continuation, text, binary) all collapse into `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Normal,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    /// Map a Hybi-07+ opcode nibble, or `None` for reserved values.
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x0..=0x2 => Some(Opcode::Normal),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xa => Some(Opcode::Pong),
            _ => None,
        }
    }

    /// Wire nibble used when the server emits a frame of this kind.
    /// `Normal` is sent as binary unless the caller picks text.
    pub fn nibble(self) -> u8 {
        match self {
            Opcode::Normal => OPCODE_BINARY,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xa,
        }
    }

    pub fn is_control(self) -> bool {
        !matches!(self, Opcode::Normal)
    }
}

pub const OPCODE_TEXT: u8 = 0x1;
pub const OPCODE_BINARY: u8 = 0x2;

/// Status code used when a Close frame carries no code of its own.
pub const CLOSE_NORMAL: u16 = 1000;

/// One decoded (or to-be-encoded) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    /// Payload, already unmasked when produced by the decoder.
    pub payload: Bytes,
    pub masked: bool,
    pub mask_key: Option<[u8; 4]>,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
            masked: false,
            mask_key: None,
        }
    }

    pub fn normal(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Normal, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Build a Close frame with a status code and reason text.
    pub fn close(code: u16, reason: &str) -> Self {
        let mut buf = BytesMut::with_capacity(2 + reason.len());
        buf.put_u16(code);
        buf.put_slice(reason.as_bytes());
        Self::new(Opcode::Close, buf.freeze())
    }

    /// Interpret the payload of a Close frame.
    pub fn close_reason(&self) -> CloseReason {
        CloseReason::parse(&self.payload)
    }
}

/// Status code and reason carried by a Close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    /// Payloads shorter than two bytes carry no status; `(1000, "No reason given")`
    /// is synthesized for them.
    pub fn parse(payload: &[u8]) -> Self {
        if payload.len() < 2 {
            return Self {
                code: CLOSE_NORMAL,
                reason: constants::ERR_NO_REASON.to_string(),
            };
        }
        Self {
            code: u16::from_be_bytes([payload[0], payload[1]]),
            reason: String::from_utf8_lossy(&payload[2..]).into_owned(),
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.reason, self.code)
    }
}

/// An outbound application payload.
///
/// The variant picks the RFC 6455 data opcode: text frames for decoded text,
/// binary frames for raw bytes. Hybi-00 ignores the distinction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Binary(Bytes),
    Text(String),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Binary(bytes) => bytes,
            Payload::Text(text) => text.as_bytes(),
        }
    }

    pub fn opcode_nibble(&self) -> u8 {
        match self {
            Payload::Binary(_) => OPCODE_BINARY,
            Payload::Text(_) => OPCODE_TEXT,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(value))
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Binary(Bytes::copy_from_slice(value))
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Binary(value)
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

/// XOR `data` in place with the repeating 4-byte `key`.
///
/// Applying the same key twice restores the original bytes.
#[inline]
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_table() {
        assert_eq!(Opcode::from_nibble(0x0), Some(Opcode::Normal));
        assert_eq!(Opcode::from_nibble(0x1), Some(Opcode::Normal));
        assert_eq!(Opcode::from_nibble(0x2), Some(Opcode::Normal));
        assert_eq!(Opcode::from_nibble(0x8), Some(Opcode::Close));
        assert_eq!(Opcode::from_nibble(0x9), Some(Opcode::Ping));
        assert_eq!(Opcode::from_nibble(0xa), Some(Opcode::Pong));
        for nibble in (0x3..=0x7).chain(0xb..=0xf) {
            assert_eq!(Opcode::from_nibble(nibble), None, "nibble {nibble:#x}");
        }
    }

    #[test]
    fn test_close_reason_parse() {
        let frame = Frame::close(1001, "going away");
        let reason = frame.close_reason();
        assert_eq!(reason.code, 1001);
        assert_eq!(reason.reason, "going away");
    }

    #[test]
    fn test_close_reason_synthesized_for_short_payload() {
        for payload in [&b""[..], &b"\x03"[..]] {
            let reason = CloseReason::parse(payload);
            assert_eq!(reason.code, 1000);
            assert_eq!(reason.reason, "No reason given");
        }
    }

    #[test]
    fn test_mask_known_vector() {
        // RFC 6455 section 5.7 masked "Hello"
        let mut data = [0x7f, 0x9f, 0x4d, 0x51, 0x58];
        apply_mask(&mut data, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(&data, b"Hello");
    }

    #[test]
    fn test_payload_opcodes() {
        assert_eq!(Payload::from("hi").opcode_nibble(), OPCODE_TEXT);
        assert_eq!(Payload::from(vec![1u8, 2]).opcode_nibble(), OPCODE_BINARY);
    }
}
