//! Aspen Router Protocol Library
//!
//! This crate provides encoding and parsing for the line-oriented ASCII
//! control protocol of Sierra Aspen matrix routers (up to 72 inputs and
//! outputs, three independently routable levels).
//!
//! # Format
//! - Commands to the router: `**<letter><params>!!`, e.g. `**Y7,3!!`
//! - Notifications from the router: `** X<out>,<in>,<level> !!` and
//!   `** Y<out>,<in> !!`
//! - Errors from the router: any text containing `ERROR`
//!
//! # Example
//!
//! ```rust
//! use aspen_protocol::{AspenCodec, Level, ProtocolCodec, RouterResponse};
//! use aspen_protocol::command::encode_crosspoint;
//!
//! assert_eq!(encode_crosspoint(5, 12, Some(Level::Level2)), "**X5,12,2!!");
//!
//! let mut codec = AspenCodec::new();
//! codec.push_bytes(b"** X5,12,2 !!");
//!
//! assert_eq!(
//!     codec.next_message(),
//!     Some(RouterResponse::CrosspointChanged { output: 5, input: 12, level: Level::Level2 })
//! );
//! ```

pub mod command;
pub mod error;
pub mod response;

pub use command::{parse_command, InputId, OutputId, RouterCommand, AUTO_UPDATE_WITH_RESPONSE};
pub use error::ParseError;
pub use response::{parse_response, AspenCodec, RouterResponse};

/// Opening marker of every message
pub const COMMAND_PREFIX: &str = "**";

/// Closing marker of every message
pub const TERMINATOR: &str = "!!";

/// Default TCP port of the router's control interface
pub const DEFAULT_PORT: u16 = 23;

/// Highest input/output number on the largest Aspen frame
pub const MAX_PORTS: u16 = 72;

/// An independently routable signal path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Level {
    /// Level 1 (typically video)
    Level1,
    /// Level 2 (typically audio left)
    Level2,
    /// Level 3 (typically audio right)
    Level3,
}

impl Level {
    /// All levels in wire order
    pub const ALL: [Level; 3] = [Level::Level1, Level::Level2, Level::Level3];

    /// Wire index of this level (1..=3)
    pub fn index(&self) -> u16 {
        match self {
            Self::Level1 => 1,
            Self::Level2 => 2,
            Self::Level3 => 3,
        }
    }

    /// Level for a wire index; `0` (AFV) and out-of-range values have none
    pub fn from_index(index: u16) -> Option<Self> {
        match index {
            1 => Some(Self::Level1),
            2 => Some(Self::Level2),
            3 => Some(Self::Level3),
            _ => None,
        }
    }

    /// Returns a human-readable name for the level
    pub fn name(&self) -> &'static str {
        match self {
            Self::Level1 => "Level 1",
            Self::Level2 => "Level 2",
            Self::Level3 => "Level 3",
        }
    }
}

/// Which levels a routing query should consider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LevelSelector {
    /// Match if any level carries the input
    #[default]
    Any,
    /// Match only the given level
    Level(Level),
}

impl From<Level> for LevelSelector {
    fn from(level: Level) -> Self {
        Self::Level(level)
    }
}

/// Trait for codecs that parse incoming data streams
pub trait ProtocolCodec {
    /// The message type produced by this codec
    type Message;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete message from the buffer
    fn next_message(&mut self) -> Option<Self::Message>;

    /// Try to extract the next complete message along with its raw bytes
    ///
    /// This is useful for traffic monitoring where we want to show the exact
    /// bytes that were parsed for each message.
    fn next_message_with_bytes(&mut self) -> Option<(Self::Message, Vec<u8>)>;

    /// Clear the internal buffer
    fn clear(&mut self);
}

/// Trait for commands that can be encoded to bytes
pub trait EncodeCommand {
    /// Encode this command to its wire format
    fn encode(&self) -> Vec<u8>;
}
