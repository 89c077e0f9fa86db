//! Console command parsing

use aspen_protocol::{InputId, Level, LevelSelector, OutputId, MAX_PORTS};
use thiserror::Error;

/// Help text listing every console command
pub const HELP: &str = "\
Commands:
  y <out> <in>                 route input to all levels of an output
  x <out> <in> [level]         route one level (1-3, 0 = all levels)
  v <out> <in1,in2,in3>        route per level, 0 leaves a level unchanged
  poll                         request a full status dump
  show [out]                   print known routing
  match <out> <in> [any|1|2|3] check whether an input is routed
  connect <host> [port]        reconnect to another router
  status                       print the session state
  help                         show this text
  quit                         exit";

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `y`: all-levels connect
    Connect { output: OutputId, input: InputId },
    /// `x`: single-level crosspoint, `None` = all levels
    Crosspoint {
        output: OutputId,
        input: InputId,
        level: Option<Level>,
    },
    /// `v`: one input per level
    MultiLevel {
        output: OutputId,
        inputs: Vec<InputId>,
    },
    Poll,
    Show { output: Option<OutputId> },
    Match {
        output: OutputId,
        input: InputId,
        selector: LevelSelector,
    },
    Reconnect { host: String, port: Option<u16> },
    Status,
    Help,
    Quit,
}

/// Problems with a console line
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unknown command '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{what} must be 1-{max}, got '{value}'")]
    OutOfRange {
        what: &'static str,
        value: String,
        max: u16,
    },

    #[error("level must be 0-3, got '{0}'")]
    BadLevel(String),

    #[error("level must be any, 1, 2 or 3, got '{0}'")]
    BadSelector(String),

    #[error("expected 1 to 3 comma-separated inputs, got '{0}'")]
    BadInputList(String),

    #[error("invalid port '{0}'")]
    BadPort(String),
}

/// Parse one console line; blank lines give `None`
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "y" => match args.as_slice() {
            [out, inp] => ConsoleCommand::Connect {
                output: port_number("output", out)?,
                input: port_number("input", inp)?,
            },
            _ => return Err(ConsoleError::Usage("y <out> <in>")),
        },
        "x" => match args.as_slice() {
            [out, inp] | [out, inp, _] => ConsoleCommand::Crosspoint {
                output: port_number("output", out)?,
                input: port_number("input", inp)?,
                level: match args.get(2) {
                    Some(level) => parse_level(level)?,
                    None => None,
                },
            },
            _ => return Err(ConsoleError::Usage("x <out> <in> [level]")),
        },
        "v" => match args.as_slice() {
            [out, list] => ConsoleCommand::MultiLevel {
                output: port_number("output", out)?,
                inputs: parse_input_list(list)?,
            },
            _ => return Err(ConsoleError::Usage("v <out> <in1,in2,in3>")),
        },
        "poll" => ConsoleCommand::Poll,
        "show" => match args.as_slice() {
            [] => ConsoleCommand::Show { output: None },
            [out] => ConsoleCommand::Show {
                output: Some(port_number("output", out)?),
            },
            _ => return Err(ConsoleError::Usage("show [out]")),
        },
        "match" => match args.as_slice() {
            [out, inp] | [out, inp, _] => ConsoleCommand::Match {
                output: port_number("output", out)?,
                input: port_number("input", inp)?,
                selector: match args.get(2) {
                    Some(sel) => parse_selector(sel)?,
                    None => LevelSelector::Any,
                },
            },
            _ => return Err(ConsoleError::Usage("match <out> <in> [any|1|2|3]")),
        },
        "connect" => match args.as_slice() {
            [host] => ConsoleCommand::Reconnect {
                host: host.to_string(),
                port: None,
            },
            [host, port] => ConsoleCommand::Reconnect {
                host: host.to_string(),
                port: Some(
                    port.parse()
                        .map_err(|_| ConsoleError::BadPort(port.to_string()))?,
                ),
            },
            _ => return Err(ConsoleError::Usage("connect <host> [port]")),
        },
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };
    Ok(Some(cmd))
}

fn port_number(what: &'static str, text: &str) -> Result<u16, ConsoleError> {
    text.parse::<u16>()
        .ok()
        .filter(|n| (1..=MAX_PORTS).contains(n))
        .ok_or_else(|| ConsoleError::OutOfRange {
            what,
            value: text.to_string(),
            max: MAX_PORTS,
        })
}

fn parse_level(text: &str) -> Result<Option<Level>, ConsoleError> {
    match text.parse::<u16>() {
        Ok(0) => Ok(None),
        Ok(n) => Level::from_index(n)
            .map(Some)
            .ok_or_else(|| ConsoleError::BadLevel(text.to_string())),
        Err(_) => Err(ConsoleError::BadLevel(text.to_string())),
    }
}

fn parse_selector(text: &str) -> Result<LevelSelector, ConsoleError> {
    let lower = text.to_ascii_lowercase();
    let digit = lower.strip_prefix("level").unwrap_or(&lower);
    if digit == "any" {
        return Ok(LevelSelector::Any);
    }
    digit
        .parse::<u16>()
        .ok()
        .and_then(Level::from_index)
        .map(LevelSelector::Level)
        .ok_or_else(|| ConsoleError::BadSelector(text.to_string()))
}

/// Display name for a routing query selector
pub fn selector_name(selector: LevelSelector) -> &'static str {
    match selector {
        LevelSelector::Any => "any level",
        LevelSelector::Level(level) => level.name(),
    }
}

/// Parse `3,4,0`; zero entries are kept so they leave their level alone
fn parse_input_list(text: &str) -> Result<Vec<InputId>, ConsoleError> {
    let bad = || ConsoleError::BadInputList(text.to_string());
    let inputs = text
        .split(',')
        .map(|f| {
            f.trim()
                .parse::<u16>()
                .ok()
                .filter(|n| *n <= MAX_PORTS)
                .ok_or_else(bad)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if inputs.is_empty() || inputs.len() > Level::ALL.len() {
        return Err(bad());
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_line("   "), Ok(None));
    }

    #[test]
    fn test_routing_commands() {
        assert_eq!(
            parse_line("y 7 3"),
            Ok(Some(ConsoleCommand::Connect {
                output: 7,
                input: 3
            }))
        );
        assert_eq!(
            parse_line("X 5 12 2"),
            Ok(Some(ConsoleCommand::Crosspoint {
                output: 5,
                input: 12,
                level: Some(Level::Level2)
            }))
        );
        assert_eq!(
            parse_line("x 1 9 0"),
            Ok(Some(ConsoleCommand::Crosspoint {
                output: 1,
                input: 9,
                level: None
            }))
        );
        assert_eq!(
            parse_line("v 4 3,4,0"),
            Ok(Some(ConsoleCommand::MultiLevel {
                output: 4,
                inputs: vec![3, 4, 0]
            }))
        );
    }

    #[test]
    fn test_match_selectors() {
        let selector = |line| match parse_line(line) {
            Ok(Some(ConsoleCommand::Match { selector, .. })) => selector,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(selector("match 1 2"), LevelSelector::Any);
        assert_eq!(selector("match 1 2 any"), LevelSelector::Any);
        assert_eq!(selector("match 1 2 3"), LevelSelector::Level(Level::Level3));
        assert_eq!(selector("match 1 2 level1"), LevelSelector::Level(Level::Level1));
    }

    #[test]
    fn test_selector_names() {
        assert_eq!(selector_name(LevelSelector::Any), "any level");
        assert_eq!(
            selector_name(LevelSelector::Level(Level::Level2)),
            "Level 2"
        );
    }

    #[test]
    fn test_connect_command() {
        assert_eq!(
            parse_line("connect 10.0.0.9 2323"),
            Ok(Some(ConsoleCommand::Reconnect {
                host: "10.0.0.9".into(),
                port: Some(2323)
            }))
        );
        assert!(matches!(
            parse_line("connect host notaport"),
            Err(ConsoleError::BadPort(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(
            parse_line("y 0 1"),
            Err(ConsoleError::OutOfRange { what: "output", .. })
        ));
        assert!(matches!(
            parse_line("y 1 73"),
            Err(ConsoleError::OutOfRange { what: "input", .. })
        ));
        assert!(matches!(parse_line("x 1 1 4"), Err(ConsoleError::BadLevel(_))));
        assert!(matches!(
            parse_line("v 1 1,2,3,4"),
            Err(ConsoleError::BadInputList(_))
        ));
        assert!(matches!(parse_line("y 1"), Err(ConsoleError::Usage(_))));
        assert!(matches!(
            parse_line("route 1 2"),
            Err(ConsoleError::UnknownCommand(_))
        ));
    }

    proptest! {
        #[test]
        fn any_line_parses_or_errors(line in ".{0,40}") {
            let _ = parse_line(&line);
        }

        #[test]
        fn valid_connect_always_parses(output in 1u16..=MAX_PORTS, input in 1u16..=MAX_PORTS) {
            prop_assert_eq!(
                parse_line(&format!("y {output} {input}")),
                Ok(Some(ConsoleCommand::Connect { output, input }))
            );
        }
    }
}
