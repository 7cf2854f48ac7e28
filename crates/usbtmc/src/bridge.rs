//! Async channel bridge between the Tokio runtime and the USB thread
//!
//! Bulk transfers block, so each open session runs on a dedicated thread
//! (see [`crate::worker`]). Commands cross over an `async_channel`; each
//! command carries a oneshot for its reply.

use crate::error::{Result, UsbTmcError};
use tokio::sync::oneshot;

/// Commands from the Tokio runtime to the USB thread
#[derive(Debug)]
pub enum UsbCommand {
    /// Send a device-dependent message
    Write {
        payload: Vec<u8>,
        /// Channel to send the result back
        response: oneshot::Sender<Result<()>>,
    },

    /// Read one complete response message
    Read {
        /// Channel to send the message (or error) back
        response: oneshot::Sender<Result<Vec<u8>>>,
    },

    /// Abandon a partially consumed response
    AbortRead,

    /// Close the session and stop the thread
    Shutdown,
}

/// Handle the Tokio side holds
#[derive(Debug, Clone)]
pub struct UsbTmcBridge {
    command_tx: async_channel::Sender<UsbCommand>,
}

impl UsbTmcBridge {
    /// Send a message to the instrument
    pub async fn write(&self, payload: Vec<u8>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(UsbCommand::Write {
                payload,
                response: tx,
            })
            .await
            .map_err(|_| UsbTmcError::ChannelClosed)?;
        rx.await.map_err(|_| UsbTmcError::ChannelClosed)?
    }

    /// Read one complete response message from the instrument
    pub async fn read(&self) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(UsbCommand::Read { response: tx })
            .await
            .map_err(|_| UsbTmcError::ChannelClosed)?;
        rx.await.map_err(|_| UsbTmcError::ChannelClosed)?
    }

    /// Abandon a partially consumed response
    pub async fn abort_read(&self) -> Result<()> {
        self.command_tx
            .send(UsbCommand::AbortRead)
            .await
            .map_err(|_| UsbTmcError::ChannelClosed)
    }

    /// Ask the worker to close the session and stop
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(UsbCommand::Shutdown).await;
    }
}

/// Handle the USB thread holds
pub struct UsbWorkerChannel {
    command_rx: async_channel::Receiver<UsbCommand>,
}

impl UsbWorkerChannel {
    /// Block until the next command; `None` when all bridges are gone
    pub fn recv_blocking(&self) -> Option<UsbCommand> {
        self.command_rx.recv_blocking().ok()
    }
}

/// Create a connected bridge/worker pair
pub fn create_bridge() -> (UsbTmcBridge, UsbWorkerChannel) {
    // Commands queue one deep: a second in-flight operation on the same
    // session is a usage error, not a supported scenario.
    let (command_tx, command_rx) = async_channel::bounded(1);
    (
        UsbTmcBridge { command_tx },
        UsbWorkerChannel { command_rx },
    )
}
