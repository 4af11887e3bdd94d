//! # WebSocket Wrapper
//!
//! Server-side WebSocket wrapping for an inner byte-stream protocol.
//!
//! A [`ConnectionDriver`] sits between a raw [`Transport`] and an
//! [`Application`]: it performs the opening handshake, strips framing from
//! inbound messages and frames whatever the application writes back. The
//! application never sees handshakes or frame headers.
//!
//! Under the tcp host each application also receives a [`ConnectionHandle`]
//! for writes that do not answer an inbound message.
//!
//! ## Dialects
//! - **Hybi-00** (Hixie-76): MD5 challenge handshake, `0x00 .. 0xFF` text frames
//! - **Hybi-07 / Hybi-10 / RFC 6455**: SHA-1 accept handshake, binary frames
//!   with masking, Ping/Pong and Close
//!
//! ## Payload codecs
//! A client may ask for `base64` through the protocol header; payloads are then
//! base64-encoded on the wire in both directions.
//!
//! ## Example
//! ```no_run
//! use websocket_wrapper::{Application, Outbox, WrapperConfig};
//!
//! struct Echo;
//!
//! impl Application for Echo {
//!     fn on_receive(&mut self, data: &[u8], outbox: &mut Outbox) {
//!         outbox.write(data.to_vec());
//!     }
//! }
//!
//! # async fn run() -> websocket_wrapper::Result<()> {
//! let config = WrapperConfig::from_env()?;
//! websocket_wrapper::transport::tcp::start_server(config, |_handle| Echo).await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use config::{LoggingConfig, ServerConfig, TransportConfig, WrapperConfig};
pub use core::codec::{DecodeResult, Flavor, FrameCodec};
pub use core::frame::{CloseReason, Frame, Opcode, Payload};
pub use core::payload::PayloadCodec;
pub use error::{ProtocolError, Result};
pub use protocol::driver::{Application, ConnectionDriver, Outbox, Transport};
pub use protocol::state::{Connection, State};
pub use transport::{BufferedTransport, ConnectionHandle};
