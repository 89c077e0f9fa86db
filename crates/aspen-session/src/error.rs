//! Error types for the router session

use thiserror::Error;

/// Errors surfaced by a router session
///
/// None of these are fatal. They are reported to observers through
/// [`crate::SessionEvent`] while the session either stays degraded until it
/// is re-initialized or carries on after dropping the offending item.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Transport-level failure (refused, unreachable, reset)
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// The router sent an `ERROR`-bearing message
    #[error("device error: {0}")]
    DeviceError(String),

    /// A message matched no known pattern and was dropped
    #[error("unrecognized message: {0}")]
    UnrecognizedMessage(String),

    /// A command was issued with no live connection and was dropped
    #[error("socket not connected")]
    WriteWhileDisconnected,

    /// The session actor has stopped
    #[error("session actor is not running")]
    ActorUnavailable,
}
