//! # Core Framing Components
//!
//! Low-level frame handling for the three WebSocket dialects.
//!
//! ## Components
//! - **Frame**: opcode, payload and masking state of one wire message
//! - **Codec**: flavor-dispatched decoder/encoder over a growable byte buffer
//! - **Payload**: identity and base64 payload transforms negotiated as "protocols"
//!
//! ## Wire Formats
//! ```text
//! Hybi-00:   [0x00] [Payload(N)] [0xFF]
//! Hybi-07+:  [FIN|RSV|Opcode(1)] [MASK|Len(1)] [ExtLen(0/2/8)] [MaskKey(0/4)] [Payload(N)]
//! ```
//!
//! ## Security
//! - Maximum frame size is enforced from the header, before any payload is buffered
//! - Nothing is consumed from the receive buffer until a frame is complete

pub mod codec;
pub mod frame;
pub mod payload;
