//! Payload transforms negotiated through `Sec-WebSocket-Protocol`.
//!
//! Older browser clients (noVNC and friends) could not send binary frames and
//! instead asked for a `base64` "protocol". The transform sits between the frame
//! codec and the wrapped application.

use base64::Engine;
use bytes::Bytes;

use crate::core::frame::Payload;
use crate::error::{ProtocolError, Result};

/// A recognised payload codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadCodec {
    Identity,
    Base64,
}

impl PayloadCodec {
    /// Look up a codec by its protocol token.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "identity" => Some(PayloadCodec::Identity),
            "base64" => Some(PayloadCodec::Base64),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PayloadCodec::Identity => "identity",
            PayloadCodec::Base64 => "base64",
        }
    }

    /// Pick the first entry of a comma-separated offer that is recognised.
    pub fn select(offer: &str) -> Option<Self> {
        offer
            .split(',')
            .map(str::trim)
            .find_map(PayloadCodec::from_name)
    }

    /// Transform an outbound payload before it is framed.
    ///
    /// Base64 output is always sent as text.
    pub fn encode(self, payload: Payload) -> Payload {
        match self {
            PayloadCodec::Identity => payload,
            PayloadCodec::Base64 => Payload::Text(
                base64::engine::general_purpose::STANDARD.encode(payload.as_bytes()),
            ),
        }
    }

    /// Transform an inbound frame payload before it reaches the application.
    pub fn decode(self, payload: Bytes) -> Result<Bytes> {
        match self {
            PayloadCodec::Identity => Ok(payload),
            PayloadCodec::Base64 => base64::engine::general_purpose::STANDARD
                .decode(&payload)
                .map(Bytes::from)
                .map_err(|e| ProtocolError::PayloadDecode(e.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_select_first_recognised() {
        assert_eq!(
            PayloadCodec::select("binary, base64, identity"),
            Some(PayloadCodec::Base64)
        );
        assert_eq!(PayloadCodec::select("identity"), Some(PayloadCodec::Identity));
        assert_eq!(PayloadCodec::select("chat, superchat"), None);
        assert_eq!(PayloadCodec::select(""), None);
    }

    #[test]
    fn test_base64_roundtrip() {
        let encoded = PayloadCodec::Base64.encode(Payload::from(vec![0u8, 255, 16]));
        assert_eq!(encoded, Payload::Text("AP8Q".to_string()));
        let decoded = PayloadCodec::Base64
            .decode(Bytes::from_static(b"AP8Q"))
            .unwrap();
        assert_eq!(&decoded[..], &[0u8, 255, 16]);
    }

    #[test]
    fn test_base64_rejects_garbage() {
        assert!(matches!(
            PayloadCodec::Base64.decode(Bytes::from_static(b"!!not base64")),
            Err(ProtocolError::PayloadDecode(_))
        ));
    }

    #[test]
    fn test_identity_passthrough() {
        let payload = Payload::from("hi");
        assert_eq!(PayloadCodec::Identity.encode(payload.clone()), payload);
    }
}
