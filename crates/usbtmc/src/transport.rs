//! `Transport` implementation over a USBTMC session
//!
//! USBTMC is a polled bus: responses only arrive when the host asks. This
//! adapter maps that onto the event-driven transport contract by issuing
//! request-data cycles from inside `wait_received` and delivering whatever
//! arrives through the shared core. There is no cancellation primitive for
//! an in-flight bulk transfer; a wait that gives up still rides out the
//! current transfer's OS-level timeout.

use crate::bridge::{UsbTmcBridge, create_bridge};
use crate::capabilities::QuirkList;
use crate::discovery::find_device;
use crate::error::UsbTmcError;
use crate::session::UsbTmcSession;
use crate::worker::UsbWorkerThread;
use bytes::Bytes;
use rusb::{Context, UsbContext};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use transport::{
    ConnectionState, ReceivePredicate, Result, Transport, TransportCore, TransportError,
    TransportEvent, TransportKind,
};

pub struct UsbTmcTransport {
    core: Arc<TransportCore>,
    vendor_id: u16,
    product_id: u16,
    quirks: QuirkList,
    bridge: tokio::sync::Mutex<Option<UsbTmcBridge>>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl UsbTmcTransport {
    /// Factory entry for the `"usbtmc:<vid>:<pid>"` target form
    ///
    /// IDs are hex, with or without a `0x` prefix. Returns `None` for any
    /// other target string so callers can fall through to other factories.
    pub fn create(target: &str) -> Option<Self> {
        let rest = target.trim().strip_prefix("usbtmc:")?;
        let (vid, pid) = rest.split_once(':')?;
        Some(Self::new(target, parse_hex16(vid)?, parse_hex16(pid)?))
    }

    pub fn new(target: &str, vendor_id: u16, product_id: u16) -> Self {
        Self {
            core: Arc::new(TransportCore::new(TransportKind::UsbBulk, target)),
            vendor_id,
            product_id,
            quirks: QuirkList::builtin(),
            bridge: tokio::sync::Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Replace the RL1 quirk table before connecting
    pub fn with_quirks(mut self, quirks: QuirkList) -> Self {
        self.quirks = quirks;
        self
    }
}

fn parse_hex16(s: &str) -> Option<u16> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u16::from_str_radix(digits, 16).ok()
}

fn to_transport_error(err: UsbTmcError) -> TransportError {
    match err {
        UsbTmcError::Closed | UsbTmcError::ChannelClosed => TransportError::NotConnected,
        other => TransportError::Io(std::io::Error::other(other)),
    }
}

#[async_trait::async_trait]
impl Transport for UsbTmcTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::UsbBulk
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

        let (vid, pid, quirks) = (self.vendor_id, self.product_id, self.quirks.clone());
        let session = tokio::task::spawn_blocking(move || -> std::result::Result<_, UsbTmcError> {
            let context = Context::new()?;
            let device = find_device(&context, vid, pid)?;
            UsbTmcSession::open(&device, &quirks)
        })
        .await
        .map_err(|e| TransportError::Io(std::io::Error::other(e)))?;

        let session = match session {
            Ok(session) => session,
            Err(e) => {
                self.core.set_state(ConnectionState::Disconnected);
                return Err(to_transport_error(e));
            }
        };

        let (bridge, channel) = create_bridge();
        let handle = std::thread::Builder::new()
            .name(format!("usbtmc {:04x}:{:04x}", vid, pid))
            .spawn(move || UsbWorkerThread::new(session, channel).run())
            .map_err(TransportError::Io)?;

        *self.bridge.lock().await = Some(bridge);
        *self.worker.lock().expect("worker lock poisoned") = Some(handle);
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(bridge) = self.bridge.lock().await.take() {
            bridge.shutdown().await;
        }
        let handle = self.worker.lock().expect("worker lock poisoned").take();
        if let Some(handle) = handle {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
        self.core.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        let guard = self.bridge.lock().await;
        let bridge = guard.as_ref().ok_or(TransportError::NotConnected)?;
        bridge
            .write(bytes.to_vec())
            .await
            .map_err(to_transport_error)
    }

    async fn wait_received(&self, timeout: Duration, predicate: &ReceivePredicate) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.core.rx().wait(Duration::ZERO, predicate).await {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }

            // Nothing pending: poll the instrument with one request-data
            // cycle. The bulk transfer has its own fixed budget.
            let guard = self.bridge.lock().await;
            let bridge = guard.as_ref().ok_or(TransportError::NotConnected)?;
            match bridge.read().await {
                Ok(message) if !message.is_empty() => {
                    self.core.notify_received(Bytes::from(message));
                }
                Ok(_) => {}
                Err(UsbTmcError::Timeout) => {}
                Err(e) => return Err(to_transport_error(e)),
            }
        }
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
