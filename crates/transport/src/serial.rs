//! Serial-line transport
//!
//! Serial I/O through the `serialport` crate is blocking, so reads run on a
//! dedicated thread that pumps arrivals into the shared core with a short
//! poll timeout. Writes go through `spawn_blocking` against a cloned port
//! handle.

use crate::error::{Result, TransportError};
use crate::transport::{
    ConnectionState, ReceivePredicate, Transport, TransportCore, TransportEvent, TransportKind,
};
use bytes::Bytes;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Poll timeout of the reader thread; also bounds how fast disconnect joins
const READ_POLL: Duration = Duration::from_millis(50);

type SharedPort = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

pub struct SerialTransport {
    core: Arc<TransportCore>,
    path: String,
    baud: u32,
    writer: SharedPort,
    stop: Arc<AtomicBool>,
    reader: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl SerialTransport {
    pub fn new(target: &str, path: String, baud: u32) -> Self {
        Self {
            core: Arc::new(TransportCore::new(TransportKind::Serial, target)),
            path,
            baud,
            writer: Arc::new(Mutex::new(None)),
            stop: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
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

        let port = serialport::new(&self.path, self.baud)
            .timeout(READ_POLL)
            .open()?;
        let reader_port = port.try_clone()?;
        debug!(path = %self.path, baud = self.baud, "serial port opened");

        *self.writer.lock().expect("serial writer lock poisoned") = Some(port);
        self.stop.store(false, Ordering::SeqCst);

        let core = Arc::clone(&self.core);
        let stop = Arc::clone(&self.stop);
        let handle = std::thread::Builder::new()
            .name(format!("serial-rx {}", self.path))
            .spawn(move || read_loop(core, stop, reader_port))
            .map_err(TransportError::Io)?;
        *self.reader.lock().expect("serial reader lock poisoned") = Some(handle);

        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self
            .reader
            .lock()
            .expect("serial reader lock poisoned")
            .take();
        if let Some(handle) = handle {
            // The reader wakes at least every READ_POLL, so this join is
            // short; park it off the async executor anyway.
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
        self.writer
            .lock()
            .expect("serial writer lock poisoned")
            .take();
        self.core.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.core.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let writer = Arc::clone(&self.writer);
        let payload = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = writer.lock().expect("serial writer lock poisoned");
            let port = guard.as_mut().ok_or(TransportError::NotConnected)?;
            port.write_all(&payload).map_err(TransportError::Io)?;
            port.flush().map_err(TransportError::Io)
        })
        .await
        .map_err(|e| TransportError::Io(std::io::Error::other(e)))?
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

/// Reader thread body: poll the port, deliver arrivals, stop on fatal errors
fn read_loop(core: Arc<TransportCore>, stop: Arc<AtomicBool>, mut port: Box<dyn SerialPort>) {
    let mut chunk = [0u8; 1024];
    while !stop.load(Ordering::SeqCst) {
        match port.read(&mut chunk) {
            Ok(0) => {}
            Ok(n) => core.notify_received(Bytes::copy_from_slice(&chunk[..n])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("serial read failed: {}", e);
                core.set_state(ConnectionState::Disconnected);
                return;
            }
        }
    }
}
