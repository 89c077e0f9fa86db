//! Session Actor
//!
//! This module provides the async actor that owns a router session: the TCP
//! link, the routing table, the inbound codec and the poll timer. Every
//! mutation happens inside this one task, so the table needs no locking and
//! a poll tick can never interleave with applying a parsed message.
//!
//! # State machine
//!
//! ```text
//! Disconnected --init--> Connecting --connected--> Connected
//! Connected --socket error--> Error
//! Connected --socket closed--> Disconnected
//! any --destroy--> Disconnected
//! ```
//!
//! Nothing reconnects on its own. A new `Init` or `ConfigUpdated` command
//! tears the old link down and starts over.
//!
//! # Event delivery
//!
//! The actor never waits on the observer channel. Status and routing events
//! that do not fit are parked in a backlog and flushed in order as the
//! observer catches up; traffic and warnings are dropped instead. An observer
//! may therefore call back into the handle from its event loop.
//!
//! # Example
//!
//! ```rust,ignore
//! use aspen_session::actor::{run_session_actor, SessionCommand};
//! use tokio::sync::mpsc;
//!
//! let (cmd_tx, cmd_rx) = mpsc::channel(64);
//! let (event_tx, mut event_rx) = mpsc::channel(256);
//!
//! tokio::spawn(run_session_actor(cmd_rx, event_tx));
//! cmd_tx.send(SessionCommand::Init { config }).await?;
//! ```

use std::collections::VecDeque;

use aspen_protocol::{
    AspenCodec, EncodeCommand, InputId, LevelSelector, OutputId, ProtocolCodec, RouterCommand,
    RouterResponse,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{ConnectionStatus, SessionEvent, ROUTING_MATCH};
use crate::link::{LinkEvent, LinkHandle, LinkMessage};
use crate::table::RoutingTable;

/// Capacity of the link notification channel
const LINK_EVENT_CAPACITY: usize = 256;

/// Most status and routing events held back for a slow observer
const MAX_EVENT_BACKLOG: usize = 4096;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No link
    #[default]
    Disconnected,
    /// TCP connect in progress
    Connecting,
    /// Link up, subscribed and polling
    Connected,
    /// Link failed; waiting for re-initialization
    Error,
}

impl SessionState {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Error => "Error",
        }
    }
}

/// Commands sent to the session actor
#[derive(Debug)]
pub enum SessionCommand {
    /// Start a session with the given configuration
    Init {
        /// Where to connect and how to poll
        config: SessionConfig,
    },

    /// Configuration changed; equivalent to `Init` with the new settings
    ConfigUpdated {
        /// New configuration
        config: SessionConfig,
    },

    /// Send a command to the router (dropped with a warning if not connected)
    Send {
        /// Command to encode and send
        command: RouterCommand,
    },

    /// Ask whether an input is routed to an output
    IsRouted {
        /// Output to check
        output: OutputId,
        /// Input expected on the output
        input: InputId,
        /// Level(s) to check
        selector: LevelSelector,
        /// Channel to send back the answer
        response: oneshot::Sender<bool>,
    },

    /// Get a copy of the routing table
    Snapshot {
        /// Channel to send back the table
        response: oneshot::Sender<RoutingTable>,
    },

    /// Get the current lifecycle state
    QueryState {
        /// Channel to send back the state
        response: oneshot::Sender<SessionState>,
    },

    /// Close the link and stop polling; the actor keeps running
    Destroy,

    /// Destroy and stop the actor
    Shutdown,
}

/// Internal state for the session actor
struct SessionActorState {
    /// Settings of the current (or last) session
    config: Option<SessionConfig>,
    /// Lifecycle state
    state: SessionState,
    /// Routing as reported by the router
    table: RoutingTable,
    /// Framing and classification of inbound bytes
    codec: AspenCodec,
    /// Live link, if any
    link: Option<LinkHandle>,
    /// Generation assigned to the next link
    next_generation: u64,
    /// Full status poll timer, armed only while connected
    poll: Option<Interval>,
    /// Sender cloned into each link task
    link_tx: mpsc::Sender<LinkMessage>,
    /// Observer channel
    event_tx: mpsc::Sender<SessionEvent>,
    /// Status and routing events waiting for room on `event_tx`
    backlog: VecDeque<SessionEvent>,
}

impl SessionActorState {
    fn new(event_tx: mpsc::Sender<SessionEvent>, link_tx: mpsc::Sender<LinkMessage>) -> Self {
        Self {
            config: None,
            state: SessionState::Disconnected,
            table: RoutingTable::new(),
            codec: AspenCodec::new(),
            link: None,
            next_generation: 1,
            poll: None,
            link_tx,
            event_tx,
            backlog: VecDeque::new(),
        }
    }

    /// Deliver a status or routing event, parking it if the observer is behind
    fn deliver(&mut self, event: SessionEvent) {
        if !self.backlog.is_empty() {
            self.park(event);
            return;
        }
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => self.park(event),
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn park(&mut self, event: SessionEvent) {
        if self.backlog.len() >= MAX_EVENT_BACKLOG {
            error!("Event backlog full, dropping {:?}", event);
            return;
        }
        self.backlog.push_back(event);
    }

    /// Emit a traffic or warning event; dropped if the observer is behind
    fn emit(&mut self, event: SessionEvent) {
        if !self.backlog.is_empty() {
            debug!("Observer behind, dropping {:?}", event);
            return;
        }
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                if event.is_traffic() {
                    debug!("Event channel full, dropping traffic");
                } else {
                    warn!("Event channel full, dropping {:?}", event);
                }
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn report_status(&mut self, status: ConnectionStatus, detail: Option<String>) {
        self.deliver(SessionEvent::StatusChanged { status, detail });
    }

    /// Hand parked events over without waiting; whatever does not fit is lost
    fn drain_backlog(&mut self) {
        while let Some(event) = self.backlog.pop_front() {
            if let Err(e) = self.event_tx.try_send(event) {
                debug!("Dropping {} undelivered events: {}", self.backlog.len() + 1, e);
                self.backlog.clear();
            }
        }
    }

    /// Drop the link and the poll timer; safe to call in any state
    fn teardown(&mut self) {
        if let Some(link) = self.link.take() {
            debug!("Tearing down link {}", link.generation());
        }
        self.poll = None;
        self.codec.clear();
    }

    fn init(&mut self, config: SessionConfig) {
        self.teardown();

        let generation = self.next_generation;
        self.next_generation += 1;

        info!(
            "Initializing session to {} (link {})",
            config.address(),
            generation
        );

        self.state = SessionState::Connecting;
        self.report_status(ConnectionStatus::Connecting, None);
        self.link = Some(LinkHandle::spawn(
            generation,
            config.address(),
            self.link_tx.clone(),
        ));
        self.config = Some(config);
    }

    fn destroy(&mut self) {
        self.teardown();
        if self.state != SessionState::Disconnected {
            self.state = SessionState::Disconnected;
            self.report_status(ConnectionStatus::Disconnected, None);
        }
    }

    /// (Re)arm the poll timer; the first poll fires one interval from now
    fn start_polling(&mut self) {
        let Some(period) = self.config.as_ref().map(|c| c.poll_interval) else {
            return;
        };
        if period.is_zero() {
            warn!("Poll interval is zero, status polling disabled");
            self.poll = None;
            return;
        }
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.poll = Some(timer);
    }

    /// Encode and send a command, or drop it with a warning
    fn send_command(&mut self, command: RouterCommand) {
        let link = match (&self.link, self.state) {
            (Some(link), SessionState::Connected) => link,
            _ => {
                warn!("Socket not connected, dropping {}", command);
                self.emit(SessionEvent::Warning {
                    error: SessionError::WriteWhileDisconnected,
                });
                return;
            }
        };

        debug!("Sending: {}", command);
        let data = command.encode();
        match link.try_write(data.clone()) {
            Ok(()) => self.emit(SessionEvent::DataOut { data }),
            Err(e) => {
                warn!("Failed to queue {} for router: {}", command.name(), e);
                self.emit(SessionEvent::Warning {
                    error: SessionError::ConnectionFailure(e),
                });
            }
        }
    }

    fn handle_link_event(&mut self, generation: u64, event: LinkEvent) {
        if self.link.as_ref().map(|l| l.generation()) != Some(generation) {
            debug!("Ignoring {:?} from stale link {}", event, generation);
            return;
        }

        match event {
            LinkEvent::Connected => {
                self.state = SessionState::Connected;
                self.report_status(ConnectionStatus::Ok, None);
                self.table.reset();
                self.codec.clear();

                let mode = self
                    .config
                    .as_ref()
                    .map(|c| c.update_mode)
                    .unwrap_or(aspen_protocol::AUTO_UPDATE_WITH_RESPONSE);
                self.send_command(RouterCommand::UpdateMode { mode });
                self.start_polling();
            }

            LinkEvent::Data(data) => {
                self.codec.push_bytes(&data);
                while let Some((response, raw)) = self.codec.next_message_with_bytes() {
                    self.emit(SessionEvent::DataIn { data: raw });
                    self.handle_response(response);
                }
            }

            LinkEvent::Error(message) => {
                // Keep the table: last-known routing stays visible next to the error
                self.link = None;
                self.poll = None;
                self.state = SessionState::Error;
                self.report_status(ConnectionStatus::Error, Some(message));
            }

            LinkEvent::Closed => {
                self.link = None;
                self.poll = None;
                self.state = SessionState::Disconnected;
                self.report_status(ConnectionStatus::Disconnected, None);
            }
        }
    }

    fn handle_response(&mut self, response: RouterResponse) {
        debug!("Response: {:?}", response);

        if let Some(output) = self.table.apply(&response) {
            let routing = self.table.get(output).copied().unwrap_or_default();
            self.deliver(SessionEvent::RoutingChanged {
                tag: ROUTING_MATCH,
                output,
                routing,
            });
            return;
        }

        match response {
            RouterResponse::DeviceError { message } => {
                warn!("{}", SessionError::DeviceError(message.clone()));
                self.report_status(ConnectionStatus::Error, Some(message));
            }
            RouterResponse::Unrecognized { message } => {
                let error = SessionError::UnrecognizedMessage(message);
                debug!("{}", error);
                self.emit(SessionEvent::Warning { error });
            }
            RouterResponse::CrosspointChanged { .. } | RouterResponse::AllLevelsChanged { .. } => {}
        }
    }
}

/// Wait for the next poll tick, or forever if polling is off
async fn next_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Run the session actor
///
/// Processes commands until `Shutdown` is received or every command sender is
/// dropped, emitting status, routing and traffic events on `event_tx`.
///
/// # Arguments
///
/// * `cmd_rx` - Receiver for commands sent to the actor
/// * `event_tx` - Sender for events emitted by the actor
pub async fn run_session_actor(
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    let (link_tx, mut link_rx) = mpsc::channel(LINK_EVENT_CAPACITY);
    let flush_tx = event_tx.clone();
    let mut state = SessionActorState::new(event_tx, link_tx);
    info!("Session actor started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                match cmd {
                    SessionCommand::Init { config } => state.init(config),

                    SessionCommand::ConfigUpdated { config } => {
                        info!("Configuration updated, re-initializing session");
                        state.init(config);
                    }

                    SessionCommand::Send { command } => state.send_command(command),

                    SessionCommand::IsRouted {
                        output,
                        input,
                        selector,
                        response,
                    } => {
                        let _ = response.send(state.table.is_routed(output, input, selector));
                    }

                    SessionCommand::Snapshot { response } => {
                        let _ = response.send(state.table.clone());
                    }

                    SessionCommand::QueryState { response } => {
                        let _ = response.send(state.state);
                    }

                    SessionCommand::Destroy => state.destroy(),

                    SessionCommand::Shutdown => {
                        info!("Shutdown requested for session actor");
                        break;
                    }
                }
            }

            Some((generation, event)) = link_rx.recv() => {
                state.handle_link_event(generation, event);
            }

            _ = next_poll(&mut state.poll) => {
                debug!("Polling router status");
                state.send_command(RouterCommand::StatusPoll);
            }

            permit = flush_tx.reserve(), if !state.backlog.is_empty() => {
                match permit {
                    Ok(permit) => {
                        if let Some(event) = state.backlog.pop_front() {
                            permit.send(event);
                        }
                    }
                    Err(_) => state.backlog.clear(),
                }
            }
        }
    }

    state.destroy();
    state.drain_backlog();
    info!("Session actor stopped");
}
