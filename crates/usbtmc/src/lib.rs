//! USBTMC framing and session management for bench-link
//!
//! Implements the USB Test and Measurement Class bulk protocol over libusb
//! (via `rusb`): device/interface discovery, capability negotiation,
//! byte-exact bulk header framing, message fragmentation and reassembly,
//! and remote/local lockout handling.
//!
//! Blocking transfers run on a dedicated worker thread per session; the
//! [`UsbTmcTransport`] adapter exposes an open session through the uniform
//! [`transport::Transport`] trait.
//!
//! Retry is deliberately absent at this layer: a failed bulk transfer
//! aborts the current cycle and is reported upward. Retry policy lives in
//! the SCPI exchange.

pub mod bridge;
pub mod capabilities;
pub mod discovery;
pub mod error;
pub mod header;
pub mod reassembly;
pub mod session;
#[allow(clippy::module_inception)]
pub mod transport;
pub mod worker;

pub use bridge::{UsbCommand, UsbTmcBridge, UsbWorkerChannel, create_bridge};
pub use capabilities::{Capabilities, QuirkList, Rl1Quirk, parse_capabilities};
pub use discovery::{UsbTmcDeviceInfo, find_device, list_devices};
pub use error::{FramingError, Result, UsbTmcError};
pub use header::{BTag, HEADER_SIZE, MsgId, encode_dev_dep_out, encode_request_in};
pub use reassembly::ReadAssembly;
pub use session::{InterfaceInfo, SessionState, UsbTmcSession, find_usbtmc_interface};
pub use transport::UsbTmcTransport;
pub use worker::UsbWorkerThread;
