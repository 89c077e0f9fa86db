//! Cloneable front end for a running session actor

use aspen_protocol::{InputId, Level, LevelSelector, OutputId, RouterCommand};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::actor::{run_session_actor, SessionCommand, SessionState};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::table::RoutingTable;

/// Handle for driving a session actor
///
/// Every method only enqueues a command; connect, send and disconnect
/// outcomes arrive later as [`SessionEvent`]s. The only error is
/// [`SessionError::ActorUnavailable`] once the actor has stopped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

/// Spawn a session actor on the current tokio runtime
///
/// Returns the handle, the observer event stream and the actor task.
pub fn spawn_session(
    capacity: usize,
) -> (SessionHandle, mpsc::Receiver<SessionEvent>, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    let (event_tx, event_rx) = mpsc::channel(capacity);
    let task = tokio::spawn(run_session_actor(cmd_rx, event_tx));
    (SessionHandle::new(cmd_tx), event_rx, task)
}

impl SessionHandle {
    /// Wrap an existing actor command channel
    pub fn new(cmd_tx: mpsc::Sender<SessionCommand>) -> Self {
        Self { cmd_tx }
    }

    async fn request(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::ActorUnavailable)
    }

    /// Connect with the given configuration, replacing any current link
    pub async fn init(&self, config: SessionConfig) -> Result<(), SessionError> {
        self.request(SessionCommand::Init { config }).await
    }

    /// Apply a configuration change (full teardown and reconnect)
    pub async fn config_updated(&self, config: SessionConfig) -> Result<(), SessionError> {
        self.request(SessionCommand::ConfigUpdated { config }).await
    }

    /// Send a command; dropped with a warning event when not connected
    pub async fn send(&self, command: RouterCommand) -> Result<(), SessionError> {
        self.request(SessionCommand::Send { command }).await
    }

    /// Route an input to all levels of an output
    pub async fn connect(&self, output: OutputId, input: InputId) -> Result<(), SessionError> {
        self.send(RouterCommand::Connect { output, input }).await
    }

    /// Route an input to one level of an output (`None` = all levels)
    pub async fn crosspoint(
        &self,
        output: OutputId,
        input: InputId,
        level: Option<Level>,
    ) -> Result<(), SessionError> {
        self.send(RouterCommand::Crosspoint {
            output,
            input,
            level,
        })
        .await
    }

    /// Route one input per level of an output
    pub async fn multi_level(
        &self,
        output: OutputId,
        inputs: Vec<InputId>,
    ) -> Result<(), SessionError> {
        self.send(RouterCommand::MultiLevel { output, inputs }).await
    }

    /// Request a full status dump now instead of waiting for the next poll
    pub async fn poll_now(&self) -> Result<(), SessionError> {
        self.send(RouterCommand::StatusPoll).await
    }

    /// Whether the router last reported `input` on `output` at the selected level(s)
    pub async fn is_routed(
        &self,
        output: OutputId,
        input: InputId,
        selector: LevelSelector,
    ) -> Result<bool, SessionError> {
        let (response, rx) = oneshot::channel();
        self.request(SessionCommand::IsRouted {
            output,
            input,
            selector,
            response,
        })
        .await?;
        rx.await.map_err(|_| SessionError::ActorUnavailable)
    }

    /// Copy of the current routing table
    pub async fn snapshot(&self) -> Result<RoutingTable, SessionError> {
        let (response, rx) = oneshot::channel();
        self.request(SessionCommand::Snapshot { response }).await?;
        rx.await.map_err(|_| SessionError::ActorUnavailable)
    }

    /// Current lifecycle state
    pub async fn state(&self) -> Result<SessionState, SessionError> {
        let (response, rx) = oneshot::channel();
        self.request(SessionCommand::QueryState { response }).await?;
        rx.await.map_err(|_| SessionError::ActorUnavailable)
    }

    /// Close the link and cancel polling
    pub async fn destroy(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Destroy).await
    }

    /// Stop the actor
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Shutdown).await
    }
}
