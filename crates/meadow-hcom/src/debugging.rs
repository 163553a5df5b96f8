//! Debugging Proxy Module
//!
//! Bridges a local TCP port, where an IDE debugger connects, to the device's
//! debugger channel. One debugger client is served at a time; a new client
//! replaces the previous one. The device-to-debugger queue exists only while
//! a client is being served, so device debugger data arriving with nobody
//! connected is dropped instead of backing up the connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hcom_protocol::MAX_CHUNK_SIZE;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{Connection, OperationOptions};
use crate::error::{HcomError, HcomResult};

// ============================================================================
// Types
// ============================================================================

/// The task serving one debugger client.
struct ClientSession {
    peer: SocketAddr,
    task: JoinHandle<()>,
}

impl ClientSession {
    fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A TCP listener relaying debugger traffic to and from a device.
///
/// Dropping the server stops accepting, ends the active client and detaches
/// from the connection's debugger channel.
pub struct DebuggingServer {
    local_addr: SocketAddr,
    connection: Arc<Connection>,
    accept_task: JoinHandle<()>,
    client: Arc<Mutex<Option<ClientSession>>>,
}

impl DebuggingServer {
    /// Bind `addr` and start relaying for `connection`.
    pub async fn start(connection: Arc<Connection>, addr: SocketAddr) -> HcomResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let client = Arc::new(Mutex::new(None));

        let accept_task = tokio::spawn(accept_clients(
            listener,
            connection.clone(),
            client.clone(),
        ));

        info!(%local_addr, link = connection.name(), "debugging proxy listening");
        Ok(DebuggingServer {
            local_addr,
            connection,
            accept_task,
            client,
        })
    }

    /// Address the proxy is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether a debugger client is currently being served.
    pub fn has_client(&self) -> bool {
        self.client
            .lock()
            .as_ref()
            .is_some_and(ClientSession::is_active)
    }

    /// Peer address of the current debugger client.
    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client.lock().as_ref().map(|session| session.peer)
    }

    /// Stop the proxy.
    pub fn stop(self) {}
}

impl Drop for DebuggingServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.client.lock().take();
        self.connection.detach_debugger();
        debug!(local_addr = %self.local_addr, "debugging proxy stopped");
    }
}

/// Ask the device to start debugging on `port`, wait for it to reset, then
/// serve the proxy on `127.0.0.1:port`.
pub async fn start_session(
    connection: Arc<Connection>,
    port: u16,
    opts: OperationOptions,
) -> HcomResult<DebuggingServer> {
    let device = connection.clone();
    tokio::task::spawn_blocking(move || device.start_debugging_session(port, &opts))
        .await
        .map_err(|e| HcomError::Transport(io::Error::other(e)))??;

    DebuggingServer::start(connection, SocketAddr::from(([127, 0, 0, 1], port))).await
}

// ============================================================================
// Tasks
// ============================================================================

async fn accept_clients(
    listener: TcpListener,
    connection: Arc<Connection>,
    client: Arc<Mutex<Option<ClientSession>>>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "debugger accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not disable nagle for debugger client");
        }
        info!(%peer, "debugger connected");

        let device_queue = connection.attach_debugger();
        let session = ClientSession {
            peer,
            task: tokio::spawn(serve_client(stream, connection.clone(), device_queue)),
        };

        if let Some(previous) = client.lock().replace(session) {
            info!(peer = %previous.peer, "replacing debugger client");
        }
    }
}

/// Relay one client until either direction ends. Dropping the queue on exit
/// lets the listener detach it.
async fn serve_client(
    stream: TcpStream,
    connection: Arc<Connection>,
    device_queue: mpsc::Receiver<Bytes>,
) {
    let (reader, writer) = stream.into_split();
    tokio::select! {
        _ = pump_to_device(reader, connection) => {}
        _ = pump_to_client(writer, device_queue) => {}
    }
}

/// Debugger socket -> device.
async fn pump_to_device(mut reader: OwnedReadHalf, connection: Arc<Connection>) {
    let mut buf = vec![0u8; MAX_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                info!("debugger disconnected");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "debugger read failed");
                return;
            }
        };

        let data = Bytes::copy_from_slice(&buf[..n]);
        let device = connection.clone();
        match tokio::task::spawn_blocking(move || device.send_debugger_data(&data)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "could not forward debugger data to device"),
            Err(e) => warn!(error = %e, "debugger forwarding task failed"),
        }
    }
}

/// Device -> debugger socket.
async fn pump_to_client(mut writer: OwnedWriteHalf, mut device_queue: mpsc::Receiver<Bytes>) {
    while let Some(data) = device_queue.recv().await {
        if let Err(e) = writer.write_all(&data).await {
            debug!(error = %e, "debugger write failed");
            return;
        }
        if let Err(e) = writer.flush().await {
            debug!(error = %e, "debugger flush failed");
            return;
        }
    }
    debug!("device debugger channel closed");
}
