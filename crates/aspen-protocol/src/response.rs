//! Inbound message parsing
//!
//! The router pushes `** X<out>,<in>,<level> !!` and `** Y<out>,<in> !!`
//! notifications, plus free-form text containing `ERROR` when it rejects a
//! command. Each message is classified by an ordered list of rules; the first
//! rule that accepts the message wins and anything left over is
//! [`RouterResponse::Unrecognized`].

use crate::command::{InputId, OutputId};
use crate::error::ParseError;
use crate::{Level, ProtocolCodec, COMMAND_PREFIX, TERMINATOR};

/// Maximum message length (reasonable limit to prevent buffer growth)
const MAX_MESSAGE_LEN: usize = 128;

/// Buffered bytes allowed before unterminated data is discarded
///
/// A full status dump of a 72-output frame arrives as one burst of about
/// a kilobyte, so this must comfortably exceed a single socket read.
const MAX_BUFFER_LEN: usize = 8192;

/// Substring that marks a device-reported error
const ERROR_MARKER: &str = "ERROR";

/// A classified message received from the router
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RouterResponse {
    /// One level of an output changed: `** X<out>,<in>,<level> !!`
    CrosspointChanged {
        output: OutputId,
        input: InputId,
        level: Level,
    },

    /// All levels of an output changed to the same input: `** Y<out>,<in> !!`
    AllLevelsChanged { output: OutputId, input: InputId },

    /// The router reported an error
    DeviceError { message: String },

    /// Message did not match any known pattern
    Unrecognized { message: String },
}

impl RouterResponse {
    /// Whether this response changes routing state
    pub fn is_routing_update(&self) -> bool {
        matches!(
            self,
            Self::CrosspointChanged { .. } | Self::AllLevelsChanged { .. }
        )
    }
}

type Rule = fn(&str) -> Result<RouterResponse, ParseError>;

/// Classification rules in priority order
const RULES: &[(&str, Rule)] = &[
    ("crosspoint", parse_crosspoint),
    ("all-levels", parse_all_levels),
    ("device-error", parse_device_error),
];

/// Classify one message from the router
///
/// Never fails: text no rule accepts comes back as
/// [`RouterResponse::Unrecognized`].
pub fn parse_response(line: &str) -> RouterResponse {
    let line = line.trim();
    for (name, rule) in RULES {
        match rule(line) {
            Ok(response) => return response,
            Err(e) => tracing::trace!("{} rule rejected {:?}: {}", name, line, e),
        }
    }
    RouterResponse::Unrecognized {
        message: line.to_string(),
    }
}

/// Extract the body between `**` and `!!`, trimmed
pub(crate) fn unwrap_frame(text: &str) -> Result<&str, ParseError> {
    let start = text
        .find(COMMAND_PREFIX)
        .ok_or_else(|| ParseError::InvalidFrame(format!("missing {COMMAND_PREFIX}")))?;
    let rest = &text[start + COMMAND_PREFIX.len()..];
    let end = rest
        .find(TERMINATOR)
        .ok_or_else(|| ParseError::InvalidFrame(format!("missing {TERMINATOR}")))?;
    Ok(rest[..end].trim())
}

/// Parse comma-separated base-10 fields
pub(crate) fn parse_fields(params: &str) -> Result<Vec<u16>, ParseError> {
    params
        .split(',')
        .map(|f| {
            let f = f.trim();
            f.parse::<u16>()
                .map_err(|_| ParseError::InvalidNumber(f.to_string()))
        })
        .collect()
}

/// Split `<tag><a>,<b>,...` into numeric fields
fn numeric_fields(body: &str, tag: char, expected: usize) -> Result<Vec<u16>, ParseError> {
    let params = body
        .strip_prefix(tag)
        .ok_or_else(|| ParseError::InvalidFrame(format!("expected '{tag}' message")))?;

    let fields = parse_fields(params)?;
    if fields.len() != expected {
        return Err(ParseError::FieldCount {
            expected,
            actual: fields.len(),
        });
    }
    Ok(fields)
}

fn parse_crosspoint(text: &str) -> Result<RouterResponse, ParseError> {
    let fields = numeric_fields(unwrap_frame(text)?, 'X', 3)?;
    let level = Level::from_index(fields[2]).ok_or(ParseError::InvalidLevel(fields[2]))?;
    Ok(RouterResponse::CrosspointChanged {
        output: fields[0],
        input: fields[1],
        level,
    })
}

fn parse_all_levels(text: &str) -> Result<RouterResponse, ParseError> {
    let fields = numeric_fields(unwrap_frame(text)?, 'Y', 2)?;
    Ok(RouterResponse::AllLevelsChanged {
        output: fields[0],
        input: fields[1],
    })
}

fn parse_device_error(text: &str) -> Result<RouterResponse, ParseError> {
    if text.contains(ERROR_MARKER) {
        Ok(RouterResponse::DeviceError {
            message: text.to_string(),
        })
    } else {
        Err(ParseError::InvalidFrame("no error marker".into()))
    }
}

/// Streaming codec for bytes received from the router
///
/// Messages end at the `!!` terminator or at a line break, whichever comes
/// first, so bare `ERROR` lines are delimited as well as framed notifications.
#[derive(Debug)]
pub struct AspenCodec {
    buffer: Vec<u8>,
}

impl AspenCodec {
    /// Create a new Aspen codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_MESSAGE_LEN),
        }
    }

    /// Number of buffered bytes not yet forming a complete message
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Split the next raw message off the buffer, terminator included
    ///
    /// Blank lines are skipped. Used directly by peers that need to classify
    /// frames some other way, such as a simulated router reading commands.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let terminator = self
                .buffer
                .windows(TERMINATOR.len())
                .position(|w| w == TERMINATOR.as_bytes())
                .map(|pos| pos + TERMINATOR.len());
            let line_break = self
                .buffer
                .iter()
                .position(|&b| b == b'\r' || b == b'\n');

            let frame = match (terminator, line_break) {
                (Some(end), Some(lb)) if lb < end => {
                    let mut frame: Vec<u8> = self.buffer.drain(..=lb).collect();
                    frame.pop();
                    frame
                }
                (Some(end), _) => self.buffer.drain(..end).collect(),
                (None, Some(lb)) => {
                    let mut frame: Vec<u8> = self.buffer.drain(..=lb).collect();
                    frame.pop();
                    frame
                }
                (None, None) => return None,
            };

            if frame.iter().any(|b| !b.is_ascii_whitespace()) {
                return Some(frame);
            }
        }
    }
}

impl Default for AspenCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec for AspenCodec {
    type Message = RouterResponse;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Prevent buffer overflow
        if self.buffer.len() > MAX_BUFFER_LEN {
            // Keep only the last portion
            let start = self.buffer.len() - MAX_MESSAGE_LEN;
            self.buffer = self.buffer[start..].to_vec();
        }
    }

    fn next_message(&mut self) -> Option<Self::Message> {
        self.next_message_with_bytes().map(|(msg, _)| msg)
    }

    fn next_message_with_bytes(&mut self) -> Option<(Self::Message, Vec<u8>)> {
        let frame = self.next_frame()?;
        let text = String::from_utf8_lossy(&frame);
        Some((parse_response(&text), frame))
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}
