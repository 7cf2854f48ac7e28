//! USB worker thread
//!
//! Dedicated thread owning one open [`UsbTmcSession`]. Processes commands
//! from the Tokio runtime until shutdown, then closes the session (restoring
//! local control and the kernel driver).

use crate::bridge::{UsbCommand, UsbWorkerChannel};
use crate::session::UsbTmcSession;
use tracing::{debug, info};

pub struct UsbWorkerThread {
    session: UsbTmcSession,
    channel: UsbWorkerChannel,
}

impl UsbWorkerThread {
    pub fn new(session: UsbTmcSession, channel: UsbWorkerChannel) -> Self {
        Self { session, channel }
    }

    /// Run the command loop until shutdown or all bridges are dropped
    ///
    /// Replies whose receiver has been dropped are discarded; the caller
    /// gave up on the operation, the session state is still advanced.
    pub fn run(mut self) {
        info!("USB worker thread started");
        loop {
            match self.channel.recv_blocking() {
                Some(UsbCommand::Write { payload, response }) => {
                    let result = self.session.write(&payload);
                    if response.send(result).is_err() {
                        debug!("write reply dropped by caller");
                    }
                }
                Some(UsbCommand::Read { response }) => {
                    let result = self.session.read();
                    if response.send(result).is_err() {
                        debug!("read reply dropped by caller");
                    }
                }
                Some(UsbCommand::AbortRead) => {
                    self.session.abort_read();
                }
                Some(UsbCommand::Shutdown) | None => break,
            }
        }
        self.session.close();
        info!("USB worker thread stopped");
    }
}
