//! Virtual router simulation
//!
//! Provides a simulated Aspen router that accepts controller commands and
//! generates protocol-accurate notifications when its routing changes.

use std::collections::VecDeque;

use aspen_protocol::{
    parse_command, AspenCodec, InputId, Level, OutputId, ParseError, ProtocolCodec, RouterCommand,
    MAX_PORTS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Highest update mode the router accepts
const MAX_UPDATE_MODE: u8 = 2;

/// Reasons the virtual router rejects a command
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Command could not be parsed
    #[error("bad syntax ({0})")]
    Syntax(#[from] ParseError),

    /// Output number outside the frame
    #[error("output {0} out of range")]
    OutputRange(OutputId),

    /// Input number outside the frame
    #[error("input {0} out of range")]
    InputRange(InputId),

    /// Unsupported update mode
    #[error("update mode {0} not supported")]
    UpdateMode(u8),
}

/// Configuration for creating a virtual router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualRouterConfig {
    /// Display name/identifier
    pub id: String,
    /// Number of inputs and outputs
    pub size: u16,
}

impl Default for VirtualRouterConfig {
    fn default() -> Self {
        Self {
            id: "Virtual Aspen".to_string(),
            size: MAX_PORTS,
        }
    }
}

/// A simulated router with three levels per output
#[derive(Debug)]
pub struct VirtualRouter {
    /// Unique identifier for this virtual router
    id: String,
    /// Number of inputs and outputs
    size: u16,
    /// Input per level, indexed by output - 1
    routes: Vec<[InputId; 3]>,
    /// Push-update mode set by the controller (0 = off)
    update_mode: u8,
    /// Framing for inbound command bytes
    codec: AspenCodec,
    /// Pending output bytes (protocol-encoded)
    pending_output: VecDeque<Vec<u8>>,
}

impl VirtualRouter {
    /// Create a router of the largest frame size with output N fed by input N
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_config(VirtualRouterConfig {
            id: id.into(),
            ..Default::default()
        })
    }

    /// Create a virtual router from configuration
    pub fn from_config(config: VirtualRouterConfig) -> Self {
        Self {
            id: config.id,
            size: config.size,
            routes: (1..=config.size).map(|n| [n; 3]).collect(),
            update_mode: 0,
            codec: AspenCodec::new(),
            pending_output: VecDeque::new(),
        }
    }

    /// Get the router's unique identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of inputs and outputs
    pub fn size(&self) -> u16 {
        self.size
    }

    /// Current push-update mode
    pub fn update_mode(&self) -> u8 {
        self.update_mode
    }

    /// Input feeding an output on a level
    pub fn input(&self, output: OutputId, level: Level) -> Option<InputId> {
        self.slot(output)
            .map(|i| self.routes[i][usize::from(level.index() - 1)])
    }

    /// Forget per-connection state (update mode, partial input)
    pub fn reset_connection(&mut self) {
        self.update_mode = 0;
        self.codec.clear();
        self.pending_output.clear();
    }

    /// Process raw bytes from the controller
    ///
    /// Returns true if any routing changed.
    pub fn process_bytes(&mut self, data: &[u8]) -> bool {
        self.codec.push_bytes(data);
        let mut changed = false;
        while let Some(frame) = self.codec.next_frame() {
            let text = String::from_utf8_lossy(&frame).into_owned();
            debug!("Virtual router {} received {:?}", self.id, text);
            match parse_command(&text).map_err(RejectReason::from) {
                Ok(cmd) => match self.apply(&cmd) {
                    Ok(did_change) => changed |= did_change,
                    Err(reason) => self.queue_error(&reason),
                },
                Err(reason) => self.queue_error(&reason),
            }
        }
        changed
    }

    /// Apply a parsed controller command
    ///
    /// Returns true if any routing changed.
    pub fn apply(&mut self, cmd: &RouterCommand) -> Result<bool, RejectReason> {
        match cmd {
            RouterCommand::Connect { output, input }
            | RouterCommand::Crosspoint {
                output,
                input,
                level: None,
            } => {
                let slot = self.check(*output, *input)?;
                let changed = self.routes[slot] != [*input; 3];
                self.routes[slot] = [*input; 3];
                self.notify_all_levels(*output, *input);
                Ok(changed)
            }
            RouterCommand::Crosspoint {
                output,
                input,
                level: Some(level),
            } => {
                let slot = self.check(*output, *input)?;
                let changed = self.set_level(slot, *level, *input);
                self.notify_crosspoint(*output, *input, *level);
                Ok(changed)
            }
            RouterCommand::MultiLevel { output, inputs } => {
                let slot = self.slot(*output).ok_or(RejectReason::OutputRange(*output))?;
                // Validate everything before touching state
                for &input in inputs.iter().filter(|&&i| i != 0) {
                    self.check(*output, input)?;
                }
                let mut changed = false;
                for (level, &input) in Level::ALL.into_iter().zip(inputs) {
                    if input == 0 {
                        continue;
                    }
                    changed |= self.set_level(slot, level, input);
                    self.notify_crosspoint(*output, input, level);
                }
                Ok(changed)
            }
            RouterCommand::StatusPoll => {
                for output in 1..=self.size {
                    self.queue_status(output);
                }
                Ok(false)
            }
            RouterCommand::UpdateMode { mode } => {
                if *mode > MAX_UPDATE_MODE {
                    return Err(RejectReason::UpdateMode(*mode));
                }
                self.update_mode = *mode;
                Ok(false)
            }
        }
    }

    /// Change a route from another control source (front panel, other client)
    ///
    /// Pushes a notification if the controller subscribed to updates.
    pub fn front_panel_route(
        &mut self,
        output: OutputId,
        input: InputId,
        level: Option<Level>,
    ) -> Result<bool, RejectReason> {
        self.apply(&RouterCommand::Crosspoint {
            output,
            input,
            level,
        })
    }

    /// Take the next pending protocol-encoded output, if any
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    /// Check if there's pending output
    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }

    fn slot(&self, output: OutputId) -> Option<usize> {
        (1..=self.size)
            .contains(&output)
            .then(|| usize::from(output - 1))
    }

    /// Validate an output and input; returns the output slot
    fn check(&self, output: OutputId, input: InputId) -> Result<usize, RejectReason> {
        let slot = self.slot(output).ok_or(RejectReason::OutputRange(output))?;
        if !(1..=self.size).contains(&input) {
            return Err(RejectReason::InputRange(input));
        }
        Ok(slot)
    }

    fn set_level(&mut self, slot: usize, level: Level, input: InputId) -> bool {
        let entry = &mut self.routes[slot][usize::from(level.index() - 1)];
        let changed = *entry != input;
        *entry = input;
        changed
    }

    fn pushes_enabled(&self) -> bool {
        self.update_mode != 0
    }

    fn notify_crosspoint(&mut self, output: OutputId, input: InputId, level: Level) {
        if self.pushes_enabled() {
            self.queue_crosspoint(output, input, level);
        }
    }

    fn notify_all_levels(&mut self, output: OutputId, input: InputId) {
        if self.pushes_enabled() {
            self.queue_all_levels(output, input);
        }
    }

    fn queue_crosspoint(&mut self, output: OutputId, input: InputId, level: Level) {
        self.pending_output.push_back(
            format!("** X{},{},{} !!\r\n", output, input, level.index()).into_bytes(),
        );
    }

    fn queue_all_levels(&mut self, output: OutputId, input: InputId) {
        self.pending_output
            .push_back(format!("** Y{},{} !!\r\n", output, input).into_bytes());
    }

    /// Report one output: `Y` if all levels agree, else one `X` per level
    fn queue_status(&mut self, output: OutputId) {
        let Some(slot) = self.slot(output) else {
            return;
        };
        let [a, b, c] = self.routes[slot];
        if a == b && b == c {
            self.queue_all_levels(output, a);
        } else {
            for (level, input) in Level::ALL.into_iter().zip([a, b, c]) {
                self.queue_crosspoint(output, input, level);
            }
        }
    }

    fn queue_error(&mut self, reason: &RejectReason) {
        debug!("Virtual router {} rejecting command: {}", self.id, reason);
        self.pending_output
            .push_back(format!("ERROR: {}\r\n", reason).into_bytes());
    }
}
