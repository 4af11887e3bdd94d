//! Out-of-band control of a hosted connection.
//!
//! The tcp host hands every application a [`ConnectionHandle`] when it builds
//! it. Writes made through the handle reach the connection task even when no
//! callback is running, so an application can push output on its own schedule.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::core::frame::Payload;
use crate::error::{ProtocolError, Result};

/// Work queued for a connection task by its handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Write(Payload),
    Close(String),
}

/// Cloneable sender side of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ConnectionHandle {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send raw bytes (binary frames where the dialect distinguishes).
    pub fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(Command::Write(Payload::Binary(data.into())))
    }

    pub fn write_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::Write(Payload::Text(text.into())))
    }

    /// Send each chunk in order. Stops at the first chunk that cannot be queued.
    pub fn write_many<I, B>(&self, chunks: I) -> Result<()>
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        for chunk in chunks {
            self.write(chunk)?;
        }
        Ok(())
    }

    /// Close the connection after everything written so far.
    pub fn request_close(&self, reason: impl Into<String>) -> Result<()> {
        self.send(Command::Close(reason.into()))
    }

    /// Whether the connection task has finished.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}
