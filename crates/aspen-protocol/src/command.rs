//! Outbound command encoding
//!
//! Every command is plain ASCII wrapped as `**<body>!!`. There is no checksum,
//! no length prefix and no escaping; callers pass already-validated numbers.

use std::fmt;

use crate::error::ParseError;
use crate::response::{parse_fields, unwrap_frame};
use crate::{EncodeCommand, Level, COMMAND_PREFIX, TERMINATOR};

/// Identifier of a router output (1..=72 on current frames)
pub type OutputId = u16;

/// Identifier of a router input (1..=72 on current frames)
pub type InputId = u16;

/// Update mode requesting unsolicited pushes with command responses (`**U2!!`)
pub const AUTO_UPDATE_WITH_RESPONSE: u8 = 2;

/// Encode a level-agnostic AFV connect: `**Y<output>,<input>!!`
pub fn encode_connect(output: OutputId, input: InputId) -> String {
    format!("{COMMAND_PREFIX}Y{output},{input}{TERMINATOR}")
}

/// Encode a single-level connect: `**X<output>,<input>,<level>!!`
///
/// `None` encodes level `0`, which the router treats as AFV.
pub fn encode_crosspoint(output: OutputId, input: InputId, level: Option<Level>) -> String {
    let level = level.map_or(0, |l| l.index());
    format!("{COMMAND_PREFIX}X{output},{input},{level}{TERMINATOR}")
}

/// Encode a per-level connect: `**V<output>,<in1>,<in2>,...!!`
///
/// Inputs are applied in level order; `0` leaves that level untouched.
pub fn encode_multi_level(output: OutputId, inputs: &[InputId]) -> String {
    let csv = inputs
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{COMMAND_PREFIX}V{output},{csv}{TERMINATOR}")
}

/// Encode the full status request: `**S!!`
pub fn encode_status_poll() -> String {
    format!("{COMMAND_PREFIX}S{TERMINATOR}")
}

/// Encode the push-update subscription command: `**U<mode>!!`
pub fn encode_update_mode(mode: u8) -> String {
    format!("{COMMAND_PREFIX}U{mode}{TERMINATOR}")
}

/// Parse a command as the router receives it, e.g. `**X5,12,2!!`
///
/// This is the router-side view of the grammar; controllers only encode.
pub fn parse_command(text: &str) -> Result<RouterCommand, ParseError> {
    let body = unwrap_frame(text)?;
    let mut chars = body.chars();
    let tag = chars
        .next()
        .ok_or_else(|| ParseError::InvalidFrame("empty command".into()))?;
    let params = chars.as_str().trim();

    let expect = |fields: Vec<u16>, expected: usize| {
        if fields.len() == expected {
            Ok(fields)
        } else {
            Err(ParseError::FieldCount {
                expected,
                actual: fields.len(),
            })
        }
    };

    match tag {
        'Y' => {
            let f = expect(parse_fields(params)?, 2)?;
            Ok(RouterCommand::Connect {
                output: f[0],
                input: f[1],
            })
        }
        'X' => {
            let f = expect(parse_fields(params)?, 3)?;
            let level = match f[2] {
                0 => None,
                n => Some(Level::from_index(n).ok_or(ParseError::InvalidLevel(n))?),
            };
            Ok(RouterCommand::Crosspoint {
                output: f[0],
                input: f[1],
                level,
            })
        }
        'V' => {
            let f = parse_fields(params)?;
            if f.len() < 2 || f.len() > Level::ALL.len() + 1 {
                return Err(ParseError::FieldCount {
                    expected: Level::ALL.len() + 1,
                    actual: f.len(),
                });
            }
            Ok(RouterCommand::MultiLevel {
                output: f[0],
                inputs: f[1..].to_vec(),
            })
        }
        'S' if params.is_empty() => Ok(RouterCommand::StatusPoll),
        'U' => {
            let mode = params
                .parse::<u8>()
                .map_err(|_| ParseError::InvalidNumber(params.into()))?;
            Ok(RouterCommand::UpdateMode { mode })
        }
        _ => Err(ParseError::UnknownCommand(body.to_string())),
    }
}

/// A command sent from the controller to the router
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RouterCommand {
    /// Route an input to all levels of an output (`Y`)
    Connect { output: OutputId, input: InputId },

    /// Route an input to one level of an output, or all levels when `level` is `None` (`X`)
    Crosspoint {
        output: OutputId,
        input: InputId,
        level: Option<Level>,
    },

    /// Route one input per level in a single command (`V`)
    MultiLevel {
        output: OutputId,
        inputs: Vec<InputId>,
    },

    /// Request a full status dump (`S`)
    StatusPoll,

    /// Set the push-update subscription mode (`U`)
    UpdateMode { mode: u8 },
}

impl RouterCommand {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Crosspoint { .. } => "crosspoint",
            Self::MultiLevel { .. } => "multi-level",
            Self::StatusPoll => "status poll",
            Self::UpdateMode { .. } => "update mode",
        }
    }
}

impl fmt::Display for RouterCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Connect { output, input } => encode_connect(*output, *input),
            Self::Crosspoint {
                output,
                input,
                level,
            } => encode_crosspoint(*output, *input, *level),
            Self::MultiLevel { output, inputs } => encode_multi_level(*output, inputs),
            Self::StatusPoll => encode_status_poll(),
            Self::UpdateMode { mode } => encode_update_mode(*mode),
        };
        f.write_str(&text)
    }
}

impl EncodeCommand for RouterCommand {
    fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_connect() {
        assert_eq!(encode_connect(7, 3), "**Y7,3!!");
    }

    #[test]
    fn test_encode_crosspoint() {
        assert_eq!(encode_crosspoint(5, 12, Some(Level::Level2)), "**X5,12,2!!");
    }

    #[test]
    fn test_encode_crosspoint_afv_uses_level_zero() {
        assert_eq!(encode_crosspoint(1, 9, None), "**X1,9,0!!");
    }

    #[test]
    fn test_encode_multi_level() {
        assert_eq!(encode_multi_level(4, &[3, 4, 0]), "**V4,3,4,0!!");
    }

    #[test]
    fn test_encode_poll_and_update_mode() {
        assert_eq!(encode_status_poll(), "**S!!");
        assert_eq!(encode_update_mode(AUTO_UPDATE_WITH_RESPONSE), "**U2!!");
    }

    #[test]
    fn test_parse_command_reads_what_we_encode() {
        let commands = [
            RouterCommand::Connect {
                output: 7,
                input: 3,
            },
            RouterCommand::Crosspoint {
                output: 5,
                input: 12,
                level: Some(Level::Level2),
            },
            RouterCommand::Crosspoint {
                output: 1,
                input: 9,
                level: None,
            },
            RouterCommand::MultiLevel {
                output: 4,
                inputs: vec![3, 4, 0],
            },
            RouterCommand::StatusPoll,
            RouterCommand::UpdateMode { mode: 2 },
        ];
        for cmd in commands {
            assert_eq!(parse_command(&cmd.to_string()), Ok(cmd));
        }
    }

    #[test]
    fn test_parse_command_rejects_garbage() {
        assert!(matches!(
            parse_command("**Q1!!"),
            Err(ParseError::UnknownCommand(_))
        ));
        assert!(matches!(
            parse_command("**X1,2!!"),
            Err(ParseError::FieldCount { .. })
        ));
        assert!(matches!(
            parse_command("**X1,2,5!!"),
            Err(ParseError::InvalidLevel(5))
        ));
        assert!(matches!(
            parse_command("**V1,2,3,4,5!!"),
            Err(ParseError::FieldCount { .. })
        ));
        assert!(parse_command("Y1,2").is_err());
    }

    #[test]
    fn test_command_encode_matches_display() {
        let cmd = RouterCommand::Crosspoint {
            output: 72,
            input: 1,
            level: Some(Level::Level3),
        };
        assert_eq!(cmd.encode(), b"**X72,1,3!!");
        assert_eq!(cmd.to_string(), "**X72,1,3!!");

        let cmd = RouterCommand::MultiLevel {
            output: 2,
            inputs: vec![5, 6],
        };
        assert_eq!(cmd.encode(), b"**V2,5,6!!");
    }
}
