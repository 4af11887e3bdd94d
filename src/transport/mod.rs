//! # Transport Layer
//!
//! Hosting for [`ConnectionDriver`](crate::protocol::driver::ConnectionDriver)s
//! over real sockets.
//!
//! The driver itself is synchronous; [`BufferedTransport`] collects what it
//! writes so an async host can flush it to the socket between reads.
//! [`ConnectionHandle`] lets an application write outside its callbacks.

use bytes::{Bytes, BytesMut};

use crate::protocol::driver::Transport;

pub mod handle;
pub mod tcp;

pub use handle::ConnectionHandle;

/// In-memory [`Transport`] that queues outbound bytes until they are taken.
#[derive(Debug, Default)]
pub struct BufferedTransport {
    outbound: BytesMut,
    closing: bool,
    secure: bool,
}

impl BufferedTransport {
    pub fn new(secure: bool) -> Self {
        Self {
            outbound: BytesMut::with_capacity(4096),
            closing: false,
            secure,
        }
    }

    /// Take everything written since the last call.
    pub fn take_outbound(&mut self) -> Bytes {
        self.outbound.split().freeze()
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Whether the driver asked for the connection to be dropped.
    pub fn is_closing(&self) -> bool {
        self.closing
    }
}

impl Transport for BufferedTransport {
    fn write(&mut self, data: &[u8]) {
        self.outbound.extend_from_slice(data);
    }

    fn lose_connection(&mut self) {
        self.closing = true;
    }

    fn is_secure(&self) -> bool {
        self.secure
    }
}
