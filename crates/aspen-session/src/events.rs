//! Observer events emitted by a session
//!
//! Status changes, routing-change notifications, warnings and raw traffic
//! all flow through a single channel so observers see them in order.

use aspen_protocol::OutputId;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::table::OutputRouting;

/// Feedback tag re-evaluated after every routing change
pub const ROUTING_MATCH: &str = "routing_match";

/// Connection status as reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// A TCP connection attempt is in progress
    Connecting,
    /// Connected and subscribed
    Ok,
    /// Transport failure or device-reported error
    Error,
    /// Not connected
    Disconnected,
}

impl ConnectionStatus {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Event emitted by the session actor
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connection status changed
    StatusChanged {
        /// New status
        status: ConnectionStatus,
        /// Error text or other detail
        detail: Option<String>,
    },

    /// The routing table changed for an output
    RoutingChanged {
        /// Feedback to re-evaluate
        tag: &'static str,
        /// Output whose routing was reported
        output: OutputId,
        /// Routing of `output` after the change
        routing: OutputRouting,
    },

    /// Something was dropped or ignored
    Warning {
        /// What went wrong
        error: SessionError,
    },

    /// Data received from the router
    DataIn {
        /// Raw bytes of one message
        data: Vec<u8>,
    },

    /// Data sent to the router
    DataOut {
        /// Raw bytes written
        data: Vec<u8>,
    },
}

impl SessionEvent {
    /// Check if this is a traffic event (for traffic monitor filtering)
    pub fn is_traffic(&self) -> bool {
        matches!(self, Self::DataIn { .. } | Self::DataOut { .. })
    }

    /// Status carried by this event, if it is a status change
    pub fn status(&self) -> Option<ConnectionStatus> {
        match self {
            Self::StatusChanged { status, .. } => Some(*status),
            _ => None,
        }
    }
}
