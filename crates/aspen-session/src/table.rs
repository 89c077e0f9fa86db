//! Routing state tracking
//!
//! The table holds only what the router has reported. Commands sent by this
//! client never touch it; a route shows up once the router echoes it.

use std::collections::BTreeMap;

use aspen_protocol::{InputId, Level, LevelSelector, OutputId, RouterResponse};
use serde::{Deserialize, Serialize};

/// Reported routing of a single output, one slot per level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputRouting {
    levels: [Option<InputId>; 3],
}

impl OutputRouting {
    /// Input reported on the given level
    pub fn input(&self, level: Level) -> Option<InputId> {
        self.levels[slot(level)]
    }

    /// Record an input on one level
    pub fn set(&mut self, level: Level, input: InputId) {
        self.levels[slot(level)] = Some(input);
    }

    /// Record the same input on every level
    pub fn set_all(&mut self, input: InputId) {
        self.levels = [Some(input); 3];
    }

    /// Whether the input is reported on any level
    pub fn contains(&self, input: InputId) -> bool {
        self.levels.contains(&Some(input))
    }

    /// Input shared by all three levels, if they agree
    pub fn follow_input(&self) -> Option<InputId> {
        match self.levels {
            [Some(a), Some(b), Some(c)] if a == b && b == c => Some(a),
            _ => None,
        }
    }

    /// Format routing for display, e.g. `3/3/3` or `3/-/7`
    pub fn display(&self) -> String {
        self.levels
            .iter()
            .map(|l| l.map_or_else(|| "-".to_string(), |i| i.to_string()))
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn slot(level: Level) -> usize {
    usize::from(level.index() - 1)
}

/// Map of output to per-level input, as last reported by the router
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingTable {
    outputs: BTreeMap<OutputId, OutputRouting>,
}

impl RoutingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single-level change, creating the output entry if absent
    pub fn apply_crosspoint_changed(&mut self, output: OutputId, input: InputId, level: Level) {
        self.outputs.entry(output).or_default().set(level, input);
    }

    /// Record the same input on all three levels of an output
    ///
    /// Any previous per-level routing for that output is overwritten.
    pub fn apply_all_levels_changed(&mut self, output: OutputId, input: InputId) {
        self.outputs.entry(output).or_default().set_all(input);
    }

    /// Apply a parsed router response
    ///
    /// Returns the affected output for routing updates, `None` for responses
    /// that carry no routing state.
    pub fn apply(&mut self, response: &RouterResponse) -> Option<OutputId> {
        match *response {
            RouterResponse::CrosspointChanged {
                output,
                input,
                level,
            } => {
                self.apply_crosspoint_changed(output, input, level);
                Some(output)
            }
            RouterResponse::AllLevelsChanged { output, input } => {
                self.apply_all_levels_changed(output, input);
                Some(output)
            }
            RouterResponse::DeviceError { .. } | RouterResponse::Unrecognized { .. } => None,
        }
    }

    /// Input routed to an output on a level, `None` if never reported
    pub fn query(&self, output: OutputId, level: Level) -> Option<InputId> {
        self.outputs.get(&output).and_then(|r| r.input(level))
    }

    /// Whether `input` is routed to `output` on the selected level(s)
    ///
    /// Unknown outputs never match.
    pub fn is_routed(&self, output: OutputId, input: InputId, selector: LevelSelector) -> bool {
        let Some(routing) = self.outputs.get(&output) else {
            return false;
        };
        match selector {
            LevelSelector::Any => routing.contains(input),
            LevelSelector::Level(level) => routing.input(level) == Some(input),
        }
    }

    /// Reported routing of an output
    pub fn get(&self, output: OutputId) -> Option<&OutputRouting> {
        self.outputs.get(&output)
    }

    /// All reported outputs in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (OutputId, &OutputRouting)> {
        self.outputs.iter().map(|(o, r)| (*o, r))
    }

    /// Number of outputs with reported state
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether nothing has been reported yet
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Forget everything (used when a new connection is established)
    pub fn reset(&mut self) {
        self.outputs.clear();
    }
}
