//! # Channel
//!
//! The persistent publish/subscribe connection, abstracted from its framing.
//! Hosts implement [`Channel`] over their broker transport.

use anyhow::Result;
use bytes::Bytes;

/// An inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message { topic: String, payload: Bytes },
    Heartbeat,
}

/// Factory for broker sessions.
pub trait Channel: Send + Sync + 'static {
    type Session: Session;

    /// Connect and complete the handshake.
    fn open(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// An open broker session.
pub trait Session: Send + 'static {
    fn subscribe(&mut self, topic: &str) -> impl Future<Output = Result<()>> + Send;

    /// Publish `payload` to `destination`.
    fn send(&mut self, destination: &str, payload: Bytes)
    -> impl Future<Output = Result<()>> + Send;

    /// Send a keep-alive frame.
    fn heartbeat(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// The next inbound frame. `None` once the broker has closed the session.
    ///
    /// Must be cancel safe: it is raced against timers and outbound traffic.
    fn next(&mut self) -> impl Future<Output = Option<Result<Frame>>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}
