//! # Connection Driver
//!
//! Runs the handshake state machine over inbound byte chunks, dispatches decoded
//! payloads to the wrapped [`Application`], and frames whatever it writes back.
//!
//! The driver is synchronous and owns exactly one [`Connection`]. All mutation
//! happens inside [`ConnectionDriver::data_received`] and friends, so a host can
//! run any number of drivers side by side without locking.
//!
//! ## Flow
//! ```text
//! bytes ─▶ buffer ─▶ Request ─▶ Negotiating ─▶ (Challenge) ─▶ Frames ─▶ Application
//!                                                         ▲
//! Application ─▶ Outbox ─▶ pending queue (until Frames) ──┘─▶ FrameCodec ─▶ Transport
//! ```

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, info, trace, warn};

use crate::config::TransportConfig;
use crate::core::codec::{DecodeResult, FrameCodec};
use crate::core::frame::{Frame, Opcode, Payload};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::{try_parse_header_block, try_parse_request_line};
use crate::protocol::negotiate::{
    accept_response, challenge_response, location, negotiate, HandshakeChallenge, Upgrade,
};
use crate::protocol::state::{Connection, State};
use crate::utils::metrics::Metrics;

/// The byte stream underneath a connection.
pub trait Transport {
    /// Queue bytes for the peer.
    fn write(&mut self, data: &[u8]);

    /// Ask the transport to disconnect once queued bytes are flushed.
    fn lose_connection(&mut self);

    /// Whether TLS protects the stream (selects `wss://` locations).
    fn is_secure(&self) -> bool {
        false
    }
}

/// The wrapped protocol. It only ever sees unwrapped payload bytes.
pub trait Application {
    /// Called once when the driver is created, before any handshake bytes arrive.
    /// Writes made here are held until the handshake completes.
    fn on_connect(&mut self, _outbox: &mut Outbox) {}

    /// Called for every decoded payload, in arrival order.
    fn on_receive(&mut self, data: &[u8], outbox: &mut Outbox);

    /// Called exactly once when the connection ends, for whatever reason.
    fn on_close(&mut self, _reason: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Write(Payload),
    Close(String),
}

/// Writes and close requests issued by an [`Application`] callback.
#[derive(Debug, Default)]
pub struct Outbox {
    actions: Vec<Action>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send raw bytes (binary frames where the dialect distinguishes).
    pub fn write(&mut self, data: impl Into<Bytes>) {
        self.actions.push(Action::Write(Payload::Binary(data.into())));
    }

    /// Send text (text frames where the dialect distinguishes).
    pub fn write_text(&mut self, text: impl Into<String>) {
        self.actions.push(Action::Write(Payload::Text(text.into())));
    }

    pub fn write_many<I, B>(&mut self, chunks: I)
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        for chunk in chunks {
            self.write(chunk);
        }
    }

    /// Close the connection after everything written so far.
    pub fn request_close(&mut self, reason: impl Into<String>) {
        self.actions.push(Action::Close(reason.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Drives one connection from raw bytes to application payloads and back.
pub struct ConnectionDriver<A, T> {
    conn: Connection,
    app: A,
    transport: T,
    settings: TransportConfig,
    codec: FrameCodec,
    metrics: Option<Arc<Metrics>>,
    close_notified: bool,
}

impl<A, T> ConnectionDriver<A, T>
where
    A: Application,
    T: Transport,
{
    /// Wrap `app` around `transport`. The application's `on_connect` runs here.
    pub fn new(app: A, transport: T, settings: TransportConfig) -> Self {
        Self::build(app, transport, settings, None)
    }

    /// Like [`ConnectionDriver::new`], recording activity in shared metrics.
    pub fn with_metrics(
        app: A,
        transport: T,
        settings: TransportConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::build(app, transport, settings, Some(metrics))
    }

    fn build(app: A, transport: T, settings: TransportConfig, metrics: Option<Arc<Metrics>>) -> Self {
        let secure = transport.is_secure();
        let codec = FrameCodec::new(Default::default()).with_max_frame_size(settings.max_frame_size);
        let mut driver = Self {
            conn: Connection::new(secure),
            app,
            transport,
            settings,
            codec,
            metrics,
            close_notified: false,
        };

        let mut outbox = Outbox::new();
        driver.app.on_connect(&mut outbox);
        driver.apply(outbox);
        driver
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn state(&self) -> State {
        self.conn.state
    }

    pub fn is_closed(&self) -> bool {
        self.conn.state == State::Closed
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Feed one inbound chunk through the state machine.
    pub fn data_received(&mut self, data: &[u8]) {
        if self.is_closed() {
            trace!(bytes = data.len(), "Ignoring data on closed connection");
            return;
        }
        self.conn.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        let outcome = self.advance(&mut frames);

        for frame in frames {
            if self.is_closed() {
                break;
            }
            self.dispatch(frame);
        }

        if let Err(err) = outcome {
            self.fail(err);
        }
    }

    /// The transport went away. Queued payloads are dropped.
    pub fn connection_lost(&mut self, reason: &str) {
        if !self.is_closed() {
            debug!(state = ?self.conn.state, reason, "Transport lost");
            self.conn.close();
        }
        self.notify_close(reason);
    }

    pub fn write(&mut self, data: impl Into<Bytes>) {
        self.submit(Payload::Binary(data.into()));
    }

    pub fn write_text(&mut self, text: impl Into<String>) {
        self.submit(Payload::Text(text.into()));
    }

    pub fn write_many<I, B>(&mut self, chunks: I)
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        for chunk in chunks {
            self.write(chunk);
        }
    }

    /// Send a payload whose text/binary kind is already decided.
    pub fn write_payload(&mut self, payload: Payload) {
        self.submit(payload);
    }

    /// Close the connection, sending a Close frame where the dialect has one.
    pub fn request_close(&mut self, reason: &str) {
        if self.is_closed() {
            return;
        }
        if self.conn.state == State::Frames && self.conn.flavor.is_binary_framed() {
            self.send_frame(&Frame::close(crate::core::frame::CLOSE_NORMAL, reason));
        }
        info!(reason, "Closing connection on application request");
        self.shutdown(reason);
    }

    /// Run transitions until a full pass changes nothing.
    fn advance(&mut self, frames: &mut Vec<Frame>) -> Result<()> {
        loop {
            let before = self.conn.state;
            match before {
                State::Request => self.parse_request_line()?,
                State::Negotiating => self.parse_headers()?,
                State::Challenge(challenge) => self.answer_challenge(challenge),
                State::Frames => self.decode_frames(frames)?,
                State::Closed => {}
            }
            if self.conn.state == before {
                return Ok(());
            }
        }
    }

    fn check_handshake_size(&self) -> Result<()> {
        if self.conn.buffer.len() > self.settings.max_handshake_size {
            return Err(ProtocolError::OversizedHandshake(
                self.settings.max_handshake_size,
            ));
        }
        Ok(())
    }

    fn parse_request_line(&mut self) -> Result<()> {
        let Some((line, consumed)) = try_parse_request_line(&self.conn.buffer)? else {
            return self.check_handshake_size();
        };
        self.conn.buffer.advance(consumed);
        debug!(verb = %line.verb, path = %line.path, version = %line.version, "Request line");
        self.conn.request_path = line.path;
        self.conn.state = State::Negotiating;
        Ok(())
    }

    fn parse_headers(&mut self) -> Result<()> {
        let Some((headers, consumed)) = try_parse_header_block(&self.conn.buffer)? else {
            return self.check_handshake_size();
        };
        self.conn.buffer.advance(consumed);

        let negotiation = negotiate(&headers, &self.settings)?;
        debug!(flavor = negotiation.flavor.name(), host = %negotiation.host, "Negotiated dialect");

        self.conn.headers = headers;
        self.conn.flavor = negotiation.flavor;
        self.conn.codec = negotiation.codec;
        self.conn.host = negotiation.host;
        self.conn.origin = negotiation.origin;
        self.codec = FrameCodec::new(negotiation.flavor)
            .with_max_frame_size(self.settings.max_frame_size);

        match negotiation.upgrade {
            Upgrade::Challenge(challenge) => {
                self.conn.state = State::Challenge(challenge);
            }
            Upgrade::Accept(accept) => {
                let response =
                    accept_response(&accept, self.conn.codec, &self.settings.server_name);
                self.transport.write(&response);
                self.enter_frames();
            }
        }
        Ok(())
    }

    fn answer_challenge(&mut self, challenge: HandshakeChallenge) {
        if self.conn.buffer.len() < HandshakeChallenge::CHALLENGE_LEN {
            return;
        }
        let mut raw = [0u8; HandshakeChallenge::CHALLENGE_LEN];
        raw.copy_from_slice(&self.conn.buffer[..HandshakeChallenge::CHALLENGE_LEN]);
        self.conn.buffer.advance(HandshakeChallenge::CHALLENGE_LEN);

        let location = location(self.conn.secure, &self.conn.host, &self.conn.request_path);
        let response = challenge_response(
            &self.conn.origin,
            &location,
            self.conn.codec,
            &self.settings.server_name,
            &challenge.respond(&raw),
        );
        self.transport.write(&response);
        self.enter_frames();
    }

    fn enter_frames(&mut self) {
        self.conn.state = State::Frames;
        info!(
            flavor = self.conn.flavor.name(),
            path = %self.conn.request_path,
            codec = ?self.conn.codec,
            "WebSocket handshake complete"
        );
        if let Some(metrics) = &self.metrics {
            metrics.handshake_success();
        }

        while let Some(payload) = self.conn.pending.pop_front() {
            self.send_payload(payload);
        }
    }

    /// Decode everything complete in the buffer. Decoding stops after a Close frame.
    fn decode_frames(&mut self, frames: &mut Vec<Frame>) -> Result<()> {
        loop {
            match self.codec.decode(&mut self.conn.buffer) {
                DecodeResult::NeedMoreData => return Ok(()),
                DecodeResult::Decoded(frame) => {
                    let is_close = frame.opcode == Opcode::Close;
                    frames.push(frame);
                    if is_close {
                        return Ok(());
                    }
                }
                DecodeResult::ProtocolError(err) => return Err(err),
            }
        }
    }

    fn dispatch(&mut self, frame: Frame) {
        match frame.opcode {
            Opcode::Normal => {
                let data = match self.conn.codec {
                    Some(codec) => codec.decode(frame.payload),
                    None => Ok(frame.payload),
                };
                match data {
                    Ok(data) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.frame_received(data.len() as u64);
                        }
                        let mut outbox = Outbox::new();
                        self.app.on_receive(&data, &mut outbox);
                        self.apply(outbox);
                    }
                    Err(err) => self.fail(err),
                }
            }
            Opcode::Ping => {
                trace!(bytes = frame.payload.len(), "Answering ping");
                self.send_frame(&Frame::pong(frame.payload));
            }
            Opcode::Pong => {
                trace!(bytes = frame.payload.len(), "Ignoring pong");
            }
            Opcode::Close => {
                let reason = frame.close_reason();
                info!(code = reason.code, reason = %reason.reason, "Peer closed connection");
                self.shutdown(&reason.to_string());
            }
        }
    }

    fn apply(&mut self, outbox: Outbox) {
        for action in outbox.actions {
            match action {
                Action::Write(payload) => self.submit(payload),
                Action::Close(reason) => self.request_close(&reason),
            }
        }
    }

    fn submit(&mut self, payload: Payload) {
        match self.conn.state {
            State::Frames => self.send_payload(payload),
            State::Closed => {
                debug!(bytes = payload.len(), "Dropping write on closed connection");
            }
            _ => self.conn.pending.push_back(payload),
        }
    }

    fn send_payload(&mut self, payload: Payload) {
        let payload = match self.conn.codec {
            Some(codec) => codec.encode(payload),
            None => payload,
        };
        let mut out = BytesMut::with_capacity(payload.len() + 10);
        match self.codec.encode_payload(&payload, &mut out) {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.frame_sent(payload.len() as u64);
                }
                self.transport.write(&out);
            }
            Err(err) => warn!(error = %err, "Failed to encode outbound payload"),
        }
    }

    fn send_frame(&mut self, frame: &Frame) {
        let mut out = BytesMut::with_capacity(frame.payload.len() + 10);
        match self.codec.encode(frame, &mut out) {
            Ok(()) => self.transport.write(&out),
            Err(err) => debug!(error = %err, opcode = ?frame.opcode, "Frame not sent"),
        }
    }

    /// Close because of an error, with a best-effort Close frame for violations.
    fn fail(&mut self, err: ProtocolError) {
        if self.is_closed() {
            return;
        }
        warn!(error = %err, state = ?self.conn.state, "Closing connection");

        if let Some(metrics) = &self.metrics {
            if self.conn.state.is_handshaking() {
                metrics.handshake_failed();
            } else if err.is_violation() {
                metrics.protocol_error();
            }
        }

        if err.is_violation()
            && self.conn.state == State::Frames
            && self.conn.flavor.is_binary_framed()
        {
            self.send_frame(&Frame::close(err.close_code(), &err.to_string()));
        }
        self.shutdown(&err.to_string());
    }

    fn shutdown(&mut self, reason: &str) {
        self.conn.close();
        self.transport.lose_connection();
        self.notify_close(reason);
    }

    fn notify_close(&mut self, reason: &str) {
        if self.close_notified {
            return;
        }
        self.close_notified = true;
        let reason = if reason.is_empty() {
            constants::ERR_CONNECTION_CLOSED
        } else {
            reason
        };
        self.app.on_close(reason);
    }
}
