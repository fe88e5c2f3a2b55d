use crate::error::SessionError;
use async_trait::async_trait;
use companion_types::{ClientEvent, ServerEvent};
#[cfg(test)]
use mockall::automock;

/// Ordered stream of frames received from the agent.
pub type ServerRx = tokio::sync::mpsc::Receiver<ServerEvent>;

/// The single duplex channel to the remote agent.
///
/// Implementations deliver inbound frames in arrival order on the receiver
/// returned by `server_events`, and end that stream with `ServerEvent::Close`
/// when the connection goes away.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport {
    /// Opens the connection.
    async fn connect(&mut self) -> Result<(), SessionError>;

    /// Takes the inbound frame receiver. Only one receiver exists per connection.
    fn server_events(&mut self) -> Result<ServerRx, SessionError>;

    /// Queues a frame for sending. Failures are logged, never returned.
    fn send(&mut self, event: ClientEvent);

    /// Releases the connection. Safe to call any number of times.
    fn close(&mut self);
}
