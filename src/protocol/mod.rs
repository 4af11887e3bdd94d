//! # Protocol Layer
//!
//! The per-connection state machine that turns a raw byte stream into
//! WebSocket messages for a wrapped application.
//!
//! ## Components
//! - **Handshake**: incremental request line and header block parsing
//! - **Negotiate**: dialect detection, Hybi-00 challenge and RFC 6455 accept keys
//! - **State**: what one connection remembers between chunks
//! - **Driver**: advances the state machine and bridges to the [`driver::Application`]
//!
//! ## Dialects
//! - Hybi-00 (Hixie-76): `0x00 .. 0xFF` text frames, MD5 challenge handshake
//! - Hybi-07 / Hybi-10 / RFC 6455: binary frames, SHA-1 accept handshake

pub mod driver;
pub mod handshake;
pub mod negotiate;
pub mod state;
