//! The `Transport` trait and its shared plumbing
//!
//! Every concrete transport owns a [`TransportCore`]: connection state,
//! the event broadcast channel, and the inbound accumulation buffer. State is
//! explicit per instance; there is no ambient "currently waiting" flag.

use crate::buffer::RxBuffer;
use crate::error::Result;
use bytes::Bytes;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

/// Transport kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Loopback: every send is echoed back as received
    Echo,
    /// Outbound TCP connection to an instrument's LAN interface
    TcpClient,
    /// Listening TCP endpoint accepting a single instrument connection
    TcpServer,
    /// Serial line
    Serial,
    /// USB bulk endpoint pair (USBTMC)
    UsbBulk,
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Dialing (TCP client) or listening without a peer (TCP server)
    Connecting,
    Connected,
}

/// Connectivity and data notifications
///
/// Delivered on a broadcast channel from whatever context the underlying I/O
/// completes on.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Received(Bytes),
}

/// Condition a `wait_received` call is waiting for
///
/// Predicates are evaluated against the transport's accumulated, not yet
/// drained, inbound bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivePredicate {
    /// At least `n` bytes are pending
    ByteCount(usize),
    /// An end-of-message escape byte is pending
    Escape(u8),
    /// A byte pattern is pending
    Pattern(Vec<u8>),
}

impl ReceivePredicate {
    /// Check the predicate against the pending bytes
    pub fn is_satisfied(&self, pending: &[u8]) -> bool {
        match self {
            Self::ByteCount(n) => pending.len() >= *n,
            Self::Escape(byte) => pending.contains(byte),
            Self::Pattern(pattern) => {
                !pattern.is_empty() && pending.windows(pattern.len()).any(|w| w == &pattern[..])
            }
        }
    }
}

/// Uniform byte-stream endpoint over TCP, serial, loopback, or USB bulk
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Transport kind
    fn kind(&self) -> TransportKind;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// The target specification this transport was created from
    fn target(&self) -> &str;

    /// Establish the connection (dial, listen, or open the port)
    async fn connect(&self) -> Result<()>;

    /// Tear down the connection and release the OS handle
    async fn disconnect(&self) -> Result<()>;

    /// Transmit bytes
    ///
    /// Fails with [`TransportError::NotConnected`] while disconnected. The
    /// transport waits a bounded period for the OS to accept all bytes; a
    /// partial write within that budget is an error, never silently
    /// truncated.
    ///
    /// [`TransportError::NotConnected`]: crate::TransportError::NotConnected
    async fn send(&self, bytes: &[u8]) -> Result<()>;

    /// Wait until `predicate` is satisfied by pending inbound bytes
    ///
    /// Returns `Ok(true)` the instant the predicate holds (even with budget
    /// left) and `Ok(false)` when `timeout` lapses first. The data itself is
    /// delivered via [`TransportEvent::Received`] and [`Self::take_received`],
    /// not from this call.
    async fn wait_received(&self, timeout: Duration, predicate: &ReceivePredicate) -> Result<bool>;

    /// Drain and return all pending inbound bytes
    fn take_received(&self) -> Bytes;

    /// Discard all pending inbound bytes
    fn clear_received(&self);

    /// Subscribe to connectivity and data notifications
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

/// Shared state every transport implementation owns
///
/// Centralizes the single-writer/single-reader inbound buffer, the event
/// channel, and the connection state cell.
pub struct TransportCore {
    kind: TransportKind,
    target: String,
    state: Mutex<ConnectionState>,
    events: broadcast::Sender<TransportEvent>,
    rx: RxBuffer,
}

/// Event channel depth; laggy subscribers drop oldest notifications
const EVENT_CHANNEL_CAPACITY: usize = 256;

impl TransportCore {
    pub fn new(kind: TransportKind, target: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            kind,
            target: target.into(),
            state: Mutex::new(ConnectionState::Disconnected),
            events,
            rx: RxBuffer::new(),
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Move to a new connection state, emitting the matching event on edges
    pub fn set_state(&self, new: ConnectionState) {
        let prev = {
            let mut guard = self.state.lock().expect("state lock poisoned");
            std::mem::replace(&mut *guard, new)
        };
        if prev == new {
            return;
        }
        trace!(target_spec = %self.target, ?prev, ?new, "transport state change");
        match new {
            ConnectionState::Connected => {
                let _ = self.events.send(TransportEvent::Connected);
            }
            ConnectionState::Disconnected => {
                let _ = self.events.send(TransportEvent::Disconnected);
            }
            ConnectionState::Connecting => {}
        }
    }

    /// Deliver inbound bytes: append to the buffer and broadcast
    ///
    /// Callable from async tasks and plain threads alike.
    pub fn notify_received(&self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.rx.push(&bytes);
        let _ = self.events.send(TransportEvent::Received(bytes));
    }

    pub fn rx(&self) -> &RxBuffer {
        &self.rx
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
