//! Aspen Router Session
//!
//! This crate keeps a live view of a Sierra Aspen matrix router's routing
//! while letting a controller issue routing commands.
//!
//! # Architecture
//!
//! A single actor task owns everything that changes:
//! - the TCP link, run in its own task and torn down on every re-init
//! - the [`RoutingTable`], updated only from messages the router sends
//! - a poll timer sending `**S!!` every 10 seconds while connected
//!
//! Observers receive [`SessionEvent`]s (status, routing changes, warnings and
//! raw traffic) through one channel.
//!
//! # Example
//!
//! ```rust,no_run
//! use aspen_protocol::LevelSelector;
//! use aspen_session::{spawn_session, SessionConfig, SessionEvent};
//!
//! # async fn demo() -> Result<(), aspen_session::SessionError> {
//! let (session, mut events, _task) = spawn_session(256);
//! session.init(SessionConfig::new("192.168.0.100", 23)).await?;
//! session.connect(7, 3).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::RoutingChanged { output: 7, .. } = event {
//!         assert!(session.is_routed(7, 3, LevelSelector::Any).await?);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod error;
pub mod events;
pub mod handle;
mod link;
pub mod table;

pub use actor::{run_session_actor, SessionCommand, SessionState};
pub use config::{SessionConfig, DEFAULT_POLL_INTERVAL};
pub use error::SessionError;
pub use events::{ConnectionStatus, SessionEvent, ROUTING_MATCH};
pub use handle::{spawn_session, SessionHandle};
pub use table::{OutputRouting, RoutingTable};
