//! Error types for the session core.

/// Errors a session can run into.
///
/// Only `NotAuthenticated` and `SessionActive` are returned to a caller that
/// has to act on them; the rest are either logged or turned into a fallback
/// message in the transcript.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("a user id is required before starting a session")]
    NotAuthenticated,
    #[error("a session is already live; end it before starting another")]
    SessionActive,
    #[error("session start was cancelled")]
    Cancelled,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("agent error: {0}")]
    Remote(String),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}
