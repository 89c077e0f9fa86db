//! Aspen Router Simulation Library
//!
//! This crate provides a simulated Sierra Aspen router for exercising
//! controllers without physical hardware. It includes:
//!
//! - **VirtualRouter**: Routing state for up to 72 outputs on three levels,
//!   answering controller commands with protocol-accurate notifications
//! - **serve_tcp**: Serves a virtual router on a TCP listener
//!
//! # Example
//!
//! ```rust
//! use aspen_protocol::Level;
//! use aspen_sim::VirtualRouter;
//!
//! let mut router = VirtualRouter::new("Studio A");
//!
//! // Subscribe to updates, then route input 3 to output 7
//! router.process_bytes(b"**U2!!**Y7,3!!");
//! assert_eq!(router.input(7, Level::Level1), Some(3));
//!
//! // Get pending protocol-encoded output
//! while let Some(bytes) = router.take_output() {
//!     println!("Router output: {:?}", String::from_utf8_lossy(&bytes));
//! }
//! ```

pub mod router;
pub mod router_task;

pub use router::{RejectReason, VirtualRouter, VirtualRouterConfig};
pub use router_task::{run_virtual_router_task, serve_tcp, ConnectionEnd, VirtualRouterCommand};
