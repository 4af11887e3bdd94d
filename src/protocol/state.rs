//! Per-connection state owned by a [`crate::protocol::driver::ConnectionDriver`].

use std::collections::VecDeque;

use bytes::BytesMut;

use crate::core::codec::Flavor;
use crate::core::frame::Payload;
use crate::core::payload::PayloadCodec;
use crate::protocol::handshake::Headers;
use crate::protocol::negotiate::HandshakeChallenge;

/// Handshake and framing phases of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Waiting for the request line.
    Request,
    /// Waiting for the header block.
    Negotiating,
    /// Hybi-00 only: waiting for the 8 challenge bytes.
    Challenge(HandshakeChallenge),
    /// Handshake complete; exchanging frames.
    Frames,
    /// Terminal.
    Closed,
}

impl State {
    pub fn is_handshaking(self) -> bool {
        matches!(
            self,
            State::Request | State::Negotiating | State::Challenge(_)
        )
    }
}

/// Everything one connection remembers between inbound chunks.
#[derive(Debug)]
pub struct Connection {
    /// Unparsed inbound bytes, consumed only from the front.
    pub(crate) buffer: BytesMut,
    pub(crate) state: State,
    pub(crate) flavor: Flavor,
    pub(crate) host: String,
    pub(crate) origin: String,
    pub(crate) request_path: String,
    pub(crate) headers: Headers,
    pub(crate) codec: Option<PayloadCodec>,
    /// Outbound payloads written before the handshake completed.
    pub(crate) pending: VecDeque<Payload>,
    pub(crate) secure: bool,
}

impl Connection {
    pub fn new(secure: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            state: State::Request,
            flavor: Flavor::Unknown,
            host: String::new(),
            origin: String::new(),
            request_path: String::new(),
            headers: Headers::new(),
            codec: None,
            pending: VecDeque::new(),
            secure,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn codec(&self) -> Option<PayloadCodec> {
        self.codec
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Bytes received but not yet parsed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Payloads waiting for the handshake to finish.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Move to `Closed`, dropping any unsent payloads and unparsed input.
    pub(crate) fn close(&mut self) {
        self.state = State::Closed;
        self.pending.clear();
        self.buffer.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_connection() {
        let conn = Connection::new(true);
        assert_eq!(conn.state(), State::Request);
        assert_eq!(conn.flavor(), Flavor::Unknown);
        assert!(conn.is_secure());
        assert_eq!(conn.buffered(), 0);
    }

    #[test]
    fn test_close_discards_pending() {
        let mut conn = Connection::new(false);
        conn.pending.push_back(Payload::from("queued"));
        conn.buffer.extend_from_slice(b"partial");
        conn.close();
        assert_eq!(conn.state(), State::Closed);
        assert_eq!(conn.pending(), 0);
        assert_eq!(conn.buffered(), 0);
    }

    #[test]
    fn test_handshaking_states() {
        assert!(State::Request.is_handshaking());
        let challenge = HandshakeChallenge::from_keys("1 2", "3 4").unwrap();
        assert!(State::Challenge(challenge).is_handshaking());
        assert!(!State::Frames.is_handshaking());
        assert!(!State::Closed.is_handshaking());
    }
}
