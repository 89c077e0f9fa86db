//! TCP link to the router
//!
//! Each connection attempt runs in its own spawned task that owns the socket.
//! The task reports back to the session actor through a channel, tagging every
//! notification with the generation it was started with so the actor can
//! ignore a link it has already torn down. Outbound bytes reach the task
//! through a bounded queue.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the outbound write queue
///
/// Writes are never awaited: a command that finds the queue full is refused
/// by [`LinkHandle::try_write`] and reported to observers as a
/// `ConnectionFailure` warning rather than held back.
const WRITE_QUEUE: usize = 8;

/// Size of the read buffer
const READ_BUFFER: usize = 1024;

/// Notifications from a link task to the session actor
#[derive(Debug)]
pub(crate) enum LinkEvent {
    /// TCP connection established
    Connected,
    /// Bytes received
    Data(Vec<u8>),
    /// Connect, read or write failed
    Error(String),
    /// Remote end closed the connection
    Closed,
}

/// Link notification tagged with its generation
pub(crate) type LinkMessage = (u64, LinkEvent);

/// Handle to a running link task
///
/// Dropping the handle aborts the task, which closes the socket.
pub(crate) struct LinkHandle {
    generation: u64,
    write_tx: mpsc::Sender<Vec<u8>>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    /// Start connecting to `address` in a new task
    pub(crate) fn spawn(
        generation: u64,
        address: String,
        link_tx: mpsc::Sender<LinkMessage>,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE);
        let task = tokio::spawn(run_link(generation, address, write_rx, link_tx));
        Self {
            generation,
            write_tx,
            task,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue bytes for writing without waiting; fails once `WRITE_QUEUE`
    /// writes are outstanding
    pub(crate) fn try_write(&self, data: Vec<u8>) -> Result<(), String> {
        self.write_tx.try_send(data).map_err(|e| e.to_string())
    }
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_link(
    generation: u64,
    address: String,
    mut write_rx: mpsc::Receiver<Vec<u8>>,
    link_tx: mpsc::Sender<LinkMessage>,
) {
    debug!("Connecting to router at {} (link {})", address, generation);

    let stream = match TcpStream::connect(&address).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Connection to {} failed: {}", address, e);
            let _ = link_tx.send((generation, LinkEvent::Error(e.to_string()))).await;
            return;
        }
    };

    // Commands are a few bytes each
    let _ = stream.set_nodelay(true);
    info!("Connected to router at {}", address);
    let _ = link_tx.send((generation, LinkEvent::Connected)).await;

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_BUFFER];

    loop {
        tokio::select! {
            data = write_rx.recv() => {
                let Some(data) = data else {
                    debug!("Link {} write queue closed", generation);
                    break;
                };
                let result = async {
                    writer.write_all(&data).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = result {
                    warn!("Write error on link {}: {}", generation, e);
                    let _ = link_tx.send((generation, LinkEvent::Error(e.to_string()))).await;
                    break;
                }
            }

            result = reader.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Router closed link {}", generation);
                        let _ = link_tx.send((generation, LinkEvent::Closed)).await;
                        break;
                    }
                    Ok(n) => {
                        let _ = link_tx
                            .send((generation, LinkEvent::Data(buf[..n].to_vec())))
                            .await;
                    }
                    Err(e) => {
                        warn!("Read error on link {}: {}", generation, e);
                        let _ = link_tx.send((generation, LinkEvent::Error(e.to_string()))).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("Link {} task ended", generation);
}
