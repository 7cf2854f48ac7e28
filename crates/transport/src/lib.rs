//! Transport abstraction for bench-link
//!
//! A [`Transport`] is a uniform byte-stream endpoint over one of the buses an
//! instrument can hang off: a loopback used for protocol self-tests, a TCP
//! client or single-peer TCP server, or a serial line. The USB bulk transport
//! lives in the `usbtmc` crate and implements the same trait.
//!
//! Transports deliver inbound bytes through [`TransportEvent::Received`]
//! notifications and an internal accumulation buffer that callers probe with
//! [`Transport::wait_received`]. Notifications may fire from whatever task or
//! thread the underlying I/O completes on; consumers must not assume a
//! particular execution context.

pub mod buffer;
pub mod echo;
pub mod error;
pub mod serial;
pub mod target;
pub mod tcp;
#[allow(clippy::module_inception)]
pub mod transport;

pub use buffer::RxBuffer;
pub use echo::EchoTransport;
pub use error::{Result, TransportError};
pub use serial::SerialTransport;
pub use target::{TargetSpec, create_transport};
pub use tcp::{TcpClientTransport, TcpServerTransport};
pub use transport::{
    ConnectionState, ReceivePredicate, Transport, TransportCore, TransportEvent, TransportKind,
};
