//! Virtual router actor task
//!
//! Runs a [`VirtualRouter`] against an async byte stream. The task uses a
//! select! loop to:
//! - Read controller commands from the stream and write back replies
//! - Apply front-panel route changes arriving on a channel
//! - Handle disconnect and shutdown requests

use std::io;
use std::net::SocketAddr;

use aspen_protocol::{InputId, Level, OutputId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::VirtualRouter;

/// Commands that can be sent to a virtual router task
#[derive(Debug, Clone)]
pub enum VirtualRouterCommand {
    /// Change a route as if from the router's own front panel
    FrontPanel {
        output: OutputId,
        input: InputId,
        /// `None` switches all levels
        level: Option<Level>,
    },
    /// Drop the current controller connection
    Disconnect,
    /// Stop the task
    Shutdown,
}

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The controller closed the stream
    Closed,
    /// A [`VirtualRouterCommand::Disconnect`] was received
    Disconnected,
    /// Shutdown was requested or the command channel closed
    Shutdown,
}

/// Serve one controller connection
///
/// The router is borrowed so its routing outlives the connection, the way a
/// real frame keeps its crosspoints when a control client goes away.
pub async fn run_virtual_router_task<S>(
    mut stream: S,
    router: &mut VirtualRouter,
    cmd_rx: &mut mpsc::Receiver<VirtualRouterCommand>,
) -> io::Result<ConnectionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];
    router.reset_connection();
    info!("Starting virtual router task for {}", router.id());

    let end = loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual router stream closed for {}", router.id());
                        break ConnectionEnd::Closed;
                    }
                    Ok(n) => {
                        if router.process_bytes(&buf[..n]) {
                            debug!("Virtual router {} routing changed", router.id());
                        }
                        flush_output(&mut stream, router).await?;
                    }
                    Err(e) => {
                        warn!("Virtual router {} stream error: {}", router.id(), e);
                        router.reset_connection();
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualRouterCommand::FrontPanel { output, input, level }) => {
                        match router.front_panel_route(output, input, level) {
                            Ok(_) => flush_output(&mut stream, router).await?,
                            Err(e) => warn!("Front panel route rejected: {}", e),
                        }
                    }
                    Some(VirtualRouterCommand::Disconnect) => {
                        info!("Disconnect requested for virtual router {}", router.id());
                        break ConnectionEnd::Disconnected;
                    }
                    Some(VirtualRouterCommand::Shutdown) | None => {
                        info!("Shutdown requested for virtual router {}", router.id());
                        break ConnectionEnd::Shutdown;
                    }
                }
            }
        }
    };

    router.reset_connection();
    info!("Virtual router task ended for {} ({:?})", router.id(), end);
    Ok(end)
}

async fn flush_output<S>(stream: &mut S, router: &mut VirtualRouter) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    if !router.has_output() {
        return Ok(());
    }
    while let Some(bytes) = router.take_output() {
        stream.write_all(&bytes).await?;
    }
    stream.flush().await
}

/// Accept controller connections one at a time until shut down
///
/// Front-panel changes made between connections still update the routing.
pub async fn serve_tcp(
    listener: TcpListener,
    mut router: VirtualRouter,
    mut cmd_rx: mpsc::Receiver<VirtualRouterCommand>,
) -> io::Result<()> {
    let local: Option<SocketAddr> = listener.local_addr().ok();
    info!("Virtual router {} listening on {:?}", router.id(), local);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                info!("Virtual router {} accepted {}", router.id(), peer);
                stream.set_nodelay(true)?;
                match run_virtual_router_task(stream, &mut router, &mut cmd_rx).await {
                    Ok(ConnectionEnd::Shutdown) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => warn!("Connection from {} failed: {}", peer, e),
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualRouterCommand::FrontPanel { output, input, level }) => {
                        if let Err(e) = router.front_panel_route(output, input, level) {
                            warn!("Front panel route rejected: {}", e);
                        }
                    }
                    Some(VirtualRouterCommand::Disconnect) => {}
                    Some(VirtualRouterCommand::Shutdown) | None => return Ok(()),
                }
            }
        }
    }
}
