//! Loopback transport
//!
//! Every `send` immediately loops the same bytes back through the receive
//! path. Used for protocol self-tests; has no timing semantics.

use crate::error::{Result, TransportError};
use crate::transport::{
    ConnectionState, ReceivePredicate, Transport, TransportCore, TransportEvent, TransportKind,
};
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::broadcast;

pub struct EchoTransport {
    core: TransportCore,
}

impl EchoTransport {
    pub fn new() -> Self {
        Self {
            core: TransportCore::new(TransportKind::Echo, "echo"),
        }
    }
}

impl Default for EchoTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for EchoTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Echo
    }

    fn state(&self) -> ConnectionState {
        self.core.state()
    }

    fn target(&self) -> &str {
        self.core.target()
    }

    async fn connect(&self) -> Result<()> {
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.core.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.core.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.core.notify_received(Bytes::copy_from_slice(bytes));
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_requires_connect() {
        let echo = EchoTransport::new();
        assert!(matches!(
            echo.send(b"x").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_echo_loops_bytes_back() {
        let echo = EchoTransport::new();
        echo.connect().await.expect("connect failed");

        let mut events = echo.subscribe();
        echo.send(b"*IDN?\n").await.expect("send failed");

        match events.try_recv() {
            Ok(TransportEvent::Received(bytes)) => assert_eq!(&bytes[..], b"*IDN?\n"),
            other => panic!("expected Received event, got {:?}", other),
        }
        assert_eq!(&echo.take_received()[..], b"*IDN?\n");
        // Nothing else is delivered.
        assert!(echo.take_received().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wait_received_sees_echoed_bytes() {
        let echo = EchoTransport::new();
        echo.connect().await.expect("connect failed");
        echo.send(b"MEAS:VOLT?\n").await.expect("send failed");

        let satisfied = echo
            .wait_received(Duration::from_millis(50), &ReceivePredicate::Escape(b'\n'))
            .await
            .expect("wait failed");
        assert!(satisfied);
    }
}
