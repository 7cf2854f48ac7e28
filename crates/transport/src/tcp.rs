//! TCP transports
//!
//! Two flavors: an outbound client dialing an instrument's LAN port, and a
//! listening server accepting a single instrument connection (backlog of one,
//! so a second inbound attempt while one is pending is refused by the OS).
//!
//! Inbound bytes are pumped by a reader task into the shared core; `send`
//! waits a bounded period for the OS to accept the full payload and reports a
//! partial write as an error.

use crate::error::{Result, TransportError};
use crate::transport::{
    ConnectionState, ReceivePredicate, Transport, TransportCore, TransportEvent, TransportKind,
};
use bytes::Bytes;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Wall-clock budget for the OS to accept an outbound payload
const DEFAULT_WRITE_BUDGET: Duration = Duration::from_secs(1);

/// Read chunk size for the inbound pump
const READ_CHUNK: usize = 4096;

type SharedWriter = Arc<tokio::sync::Mutex<Option<OwnedWriteHalf>>>;

/// Outbound TCP connection to an instrument
pub struct TcpClientTransport {
    core: Arc<TransportCore>,
    addr: SocketAddrV4,
    writer: SharedWriter,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    write_budget: Duration,
}

impl TcpClientTransport {
    pub fn new(target: &str, addr: SocketAddrV4) -> Self {
        Self {
            core: Arc::new(TransportCore::new(TransportKind::TcpClient, target)),
            addr,
            writer: Arc::new(tokio::sync::Mutex::new(None)),
            reader_task: Mutex::new(None),
            write_budget: DEFAULT_WRITE_BUDGET,
        }
    }
}

#[async_trait::async_trait]
impl Transport for TcpClientTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::TcpClient
    }

    fn state(&self) -> ConnectionState {
        self.core.state()
    }

    fn target(&self) -> &str {
        self.core.target()
    }

    async fn connect(&self) -> Result<()> {
        if self.core.state() != ConnectionState::Disconnected {
            return Err(TransportError::AlreadyConnected);
        }
        self.core.set_state(ConnectionState::Connecting);

        let stream = match TcpStream::connect(SocketAddr::V4(self.addr)).await {
            Ok(stream) => stream,
            Err(e) => {
                self.core.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };
        debug!(addr = %self.addr, "TCP client connected");

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);

        let task = spawn_reader(Arc::clone(&self.core), Arc::clone(&self.writer), read_half);
        *self.reader_task.lock().expect("reader task lock poisoned") = Some(task);

        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(task) = self
            .reader_task
            .lock()
            .expect("reader task lock poisoned")
            .take()
        {
            task.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.core.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        write_bounded(writer, bytes, self.write_budget).await
    }

    async fn wait_received(&self, timeout: Duration, predicate: &ReceivePredicate) -> Result<bool> {
        Ok(self.core.rx().wait(timeout, predicate).await)
    }

    fn take_received(&self) -> Bytes {
        self.core.rx().take()
    }

    fn clear_received(&self) {
        self.core.rx().clear();
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.core.subscribe()
    }
}

/// Listening TCP endpoint accepting one instrument connection at a time
///
/// While a peer is attached the listener is not polled, so further inbound
/// attempts queue in the OS backlog (depth one) or are refused. When the peer
/// drops, a `Disconnected` event fires and the listener re-arms.
pub struct TcpServerTransport {
    core: Arc<TransportCore>,
    addr: SocketAddrV4,
    writer: SharedWriter,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    bound: Mutex<Option<SocketAddr>>,
    write_budget: Duration,
}

impl TcpServerTransport {
    pub fn new(target: &str, addr: SocketAddrV4) -> Self {
        Self {
            core: Arc::new(TransportCore::new(TransportKind::TcpServer, target)),
            addr,
            writer: Arc::new(tokio::sync::Mutex::new(None)),
            accept_task: Mutex::new(None),
            bound: Mutex::new(None),
            write_budget: DEFAULT_WRITE_BUDGET,
        }
    }

    /// The address the listener is bound to
    ///
    /// Useful when binding port 0 in tests.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock().expect("bound addr lock poisoned")
    }
}

#[async_trait::async_trait]
impl Transport for TcpServerTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::TcpServer
    }

    fn state(&self) -> ConnectionState {
        self.core.state()
    }

    fn target(&self) -> &str {
        self.core.target()
    }

    async fn connect(&self) -> Result<()> {
        if self.core.state() != ConnectionState::Disconnected {
            return Err(TransportError::AlreadyConnected);
        }

        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::V4(self.addr))?;
        // Backlog of one: at most a single pending connection while a peer
        // is being served.
        let listener = socket.listen(1)?;
        let bound = listener.local_addr()?;
        *self.bound.lock().expect("bound addr lock poisoned") = Some(bound);
        info!(addr = %bound, "TCP server listening");

        self.core.set_state(ConnectionState::Connecting);

        let core = Arc::clone(&self.core);
        let writer = Arc::clone(&self.writer);
        let task = tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("TCP accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                };
                info!(%peer, "instrument connected");

                let (read_half, write_half) = stream.into_split();
                *writer.lock().await = Some(write_half);
                core.set_state(ConnectionState::Connected);

                // Serve this peer until EOF; the listener is not polled
                // meanwhile, keeping the one-peer discipline.
                pump_reads(&core, read_half).await;

                writer.lock().await.take();
                core.set_state(ConnectionState::Disconnected);
                core.set_state(ConnectionState::Connecting);
            }
        });
        *self.accept_task.lock().expect("accept task lock poisoned") = Some(task);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(task) = self
            .accept_task
            .lock()
            .expect("accept task lock poisoned")
            .take()
        {
            task.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.core.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        write_bounded(writer, bytes, self.write_budget).await
    }

    async fn wait_received(&self, timeout: Duration, predicate: &ReceivePredicate) -> Result<bool> {
        Ok(self.core.rx().wait(timeout, predicate).await)
    }

    fn take_received(&self) -> Bytes {
        self.core.rx().take()
    }

    fn clear_received(&self) {
        self.core.rx().clear();
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.core.subscribe()
    }
}

/// Spawn the inbound pump for a client connection
fn spawn_reader(
    core: Arc<TransportCore>,
    writer: SharedWriter,
    read_half: OwnedReadHalf,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        pump_reads(&core, read_half).await;
        writer.lock().await.take();
        core.set_state(ConnectionState::Disconnected);
    })
}

/// Read until EOF or error, delivering chunks into the core
async fn pump_reads(core: &TransportCore, read_half: OwnedReadHalf) {
    use tokio::io::AsyncReadExt;

    let mut read_half = read_half;
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) => {
                debug!("TCP peer closed the connection");
                break;
            }
            Ok(n) => core.notify_received(Bytes::copy_from_slice(&chunk[..n])),
            Err(e) => {
                warn!("TCP read failed: {}", e);
                break;
            }
        }
    }
}

/// Write all bytes within a wall-clock budget
///
/// A write that does not complete within the budget is reported as
/// [`TransportError::PartialWrite`] with the accepted byte count; the caller
/// decides whether the connection is still usable.
async fn write_bounded(
    writer: &mut OwnedWriteHalf,
    bytes: &[u8],
    budget: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + budget;
    let mut written = 0usize;

    while written < bytes.len() {
        let write = writer.write(&bytes[written..]);
        match tokio::time::timeout_at(deadline, write).await {
            Err(_) => {
                return Err(TransportError::PartialWrite {
                    written,
                    total: bytes.len(),
                });
            }
            Ok(Ok(0)) => {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "connection closed during write",
                )));
            }
            Ok(Ok(n)) => written += n,
            Ok(Err(e)) => return Err(e.into()),
        }
    }
    Ok(())
}
