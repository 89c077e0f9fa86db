//! Error types for Aspen protocol parsing

use thiserror::Error;

/// Errors that can occur while parsing a router message
///
/// These never escape [`crate::parse_response`]; a message that fails every
/// rule is classified as [`crate::RouterResponse::Unrecognized`] instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Message does not have the `** ... !!` wrapper or the expected shape
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A numeric field was not a base-10 integer
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// Level index outside 1..=3
    #[error("invalid level: {0}")]
    InvalidLevel(u16),

    /// Command letter not part of the protocol
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Wrong number of comma-separated fields
    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },
}
