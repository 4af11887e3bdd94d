//! Dialect negotiation and handshake responses.
//!
//! The header block decides which of the three dialects a client speaks:
//!
//! - `Sec-WebSocket-Key1` + `Sec-WebSocket-Key2`: Hybi-00 (Hixie-76). The
//!   response needs 8 more raw bytes from the stream, so it is deferred.
//! - `Sec-WebSocket-Version` 7, 8 or 13: Hybi-07, Hybi-10 or RFC 6455. The
//!   response is a SHA-1 accept key and can be sent immediately.
//!
//! Response layout:
//!
//! ```http
//! HTTP/1.1 101 Switching Protocols
//! Server: WebSocketWrapper/0.1
//! Upgrade: WebSocket
//! Connection: Upgrade
//! Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```

use base64::Engine;
use bytes::{BufMut, BytesMut};
use md5::Md5;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::config::TransportConfig;
use crate::core::codec::Flavor;
use crate::core::payload::PayloadCodec;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::Headers;

/// RFC 6455 GUID for Sec-WebSocket-Accept calculation.
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute the Sec-WebSocket-Accept value from a client key.
///
/// ```
/// use websocket_wrapper::protocol::negotiate::compute_accept_key;
///
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Derive the Hybi-00 number hidden in a `Sec-WebSocket-Key1/2` value:
/// its digits read as one base-10 integer, divided by its space count.
pub fn key_number(key: &str) -> Result<u32> {
    let spaces = key.bytes().filter(|&b| b == b' ').count() as u64;
    if spaces == 0 {
        return Err(ProtocolError::HandshakeRejected(
            constants::ERR_KEY_WITHOUT_SPACES,
        ));
    }

    let mut digits_seen = false;
    let mut number: u64 = 0;
    for digit in key.bytes().filter(u8::is_ascii_digit) {
        digits_seen = true;
        number = number
            .checked_mul(10)
            .and_then(|n| n.checked_add(u64::from(digit - b'0')))
            .ok_or(ProtocolError::HandshakeRejected(
                constants::ERR_KEY_OUT_OF_RANGE,
            ))?;
    }
    if !digits_seen {
        return Err(ProtocolError::HandshakeRejected(
            constants::ERR_KEY_WITHOUT_DIGITS,
        ));
    }

    u32::try_from(number / spaces)
        .map_err(|_| ProtocolError::HandshakeRejected(constants::ERR_KEY_OUT_OF_RANGE))
}

/// The two key numbers of a Hybi-00 handshake, waiting for the 8-byte challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandshakeChallenge {
    first: u32,
    second: u32,
}

impl HandshakeChallenge {
    /// Number of raw bytes that follow the header block.
    pub const CHALLENGE_LEN: usize = 8;

    pub fn from_keys(key1: &str, key2: &str) -> Result<Self> {
        Ok(Self {
            first: key_number(key1)?,
            second: key_number(key2)?,
        })
    }

    /// MD5 over both numbers (big-endian) followed by the challenge bytes.
    pub fn respond(self, challenge: &[u8; Self::CHALLENGE_LEN]) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(self.first.to_be_bytes());
        hasher.update(self.second.to_be_bytes());
        hasher.update(challenge);
        hasher.finalize().into()
    }
}

/// How the handshake completes for the negotiated dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upgrade {
    /// Hybi-00: wait for the challenge bytes.
    Challenge(HandshakeChallenge),
    /// Hybi-07+: reply with this accept key right away.
    Accept(String),
}

/// Result of a successful negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    pub flavor: Flavor,
    pub codec: Option<PayloadCodec>,
    pub host: String,
    pub origin: String,
    pub upgrade: Upgrade,
}

fn has_upgrade_token(connection: &str) -> bool {
    connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Inspect the request headers and pick a dialect.
pub fn negotiate(headers: &Headers, transport: &TransportConfig) -> Result<Negotiation> {
    if !headers
        .get("Upgrade")
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
    {
        return Err(ProtocolError::HandshakeRejected(constants::ERR_MISSING_UPGRADE));
    }
    if !headers.get("Connection").is_some_and(has_upgrade_token) {
        return Err(ProtocolError::HandshakeRejected(
            constants::ERR_MISSING_CONNECTION_UPGRADE,
        ));
    }

    let offer = headers
        .get("WebSocket-Protocol")
        .or_else(|| headers.get("Sec-WebSocket-Protocol"));
    let codec = match offer {
        Some(offer) => {
            let codec = PayloadCodec::select(offer)
                .ok_or_else(|| ProtocolError::UnsupportedCodec(offer.to_string()))?;
            debug!(codec = codec.name(), offer, "Selected payload codec");
            Some(codec)
        }
        None => None,
    };

    let host = headers
        .get("Host")
        .unwrap_or(transport.default_host.as_str())
        .to_string();
    let origin = headers
        .get("Origin")
        .unwrap_or(transport.default_origin.as_str())
        .to_string();

    let (flavor, upgrade) = match (
        headers.get("Sec-WebSocket-Key1"),
        headers.get("Sec-WebSocket-Key2"),
        headers.get("Sec-WebSocket-Version"),
    ) {
        (Some(key1), Some(key2), _) => (
            Flavor::Hybi00,
            Upgrade::Challenge(HandshakeChallenge::from_keys(key1, key2)?),
        ),
        (_, _, Some(version)) => {
            let flavor = Flavor::from_version(version)
                .ok_or_else(|| ProtocolError::UnsupportedVersion(version.to_string()))?;
            let key = headers
                .get("Sec-WebSocket-Key")
                .ok_or(ProtocolError::HandshakeRejected(constants::ERR_MISSING_KEY))?;
            (flavor, Upgrade::Accept(compute_accept_key(key)))
        }
        _ => {
            return Err(ProtocolError::HandshakeRejected(
                constants::ERR_UNKNOWN_DIALECT,
            ))
        }
    };

    Ok(Negotiation {
        flavor,
        codec,
        host,
        origin,
        upgrade,
    })
}

fn put_header(dst: &mut BytesMut, name: &str, value: &str) {
    dst.put_slice(name.as_bytes());
    dst.put_slice(b": ");
    dst.put_slice(value.as_bytes());
    dst.put_slice(b"\r\n");
}

fn put_common_preamble(dst: &mut BytesMut, server_name: &str) {
    dst.put_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    put_header(dst, "Server", server_name);
    put_header(dst, "Upgrade", "WebSocket");
    put_header(dst, "Connection", "Upgrade");
}

/// Full Hybi-07+ response, including the terminating blank line.
pub fn accept_response(accept: &str, codec: Option<PayloadCodec>, server_name: &str) -> BytesMut {
    let mut dst = BytesMut::with_capacity(192);
    put_common_preamble(&mut dst, server_name);
    put_header(&mut dst, "Sec-WebSocket-Accept", accept);
    if let Some(codec) = codec {
        put_header(&mut dst, "Sec-WebSocket-Protocol", codec.name());
    }
    dst.put_slice(b"\r\n");
    dst
}

/// `ws://` or `wss://` location echoed to Hybi-00 clients.
pub fn location(secure: bool, host: &str, path: &str) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}{path}")
}

/// Everything a Hybi-00 server sends: headers, blank line, then the raw
/// 16-byte challenge response with no trailing CRLF.
pub fn challenge_response(
    origin: &str,
    location: &str,
    codec: Option<PayloadCodec>,
    server_name: &str,
    response: &[u8; 16],
) -> BytesMut {
    let codec = codec.unwrap_or(PayloadCodec::Identity).name();

    let mut dst = BytesMut::with_capacity(256);
    put_common_preamble(&mut dst, server_name);
    put_header(&mut dst, "Sec-WebSocket-Origin", origin);
    put_header(&mut dst, "Sec-WebSocket-Location", location);
    put_header(&mut dst, "WebSocket-Protocol", codec);
    put_header(&mut dst, "Sec-WebSocket-Protocol", codec);
    dst.put_slice(b"\r\n");
    dst.put_slice(response);
    dst
}
