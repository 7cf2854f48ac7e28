//! Target specification parsing and the transport factory chain
//!
//! A target specification is a short string naming where an instrument is
//! reachable: `"echo"`, `"client:<ipv4>:<port>"`, `"server:<ipv4>:<port>"`,
//! or `"serial:<path>[:baud]"`. Parsing an unrecognized form yields `None`
//! ("not handled") rather than an error, so callers can fall through to other
//! factories; the `usbtmc` crate contributes `"usbtmc:<vid>:<pid>"` the same
//! way.

use crate::echo::EchoTransport;
use crate::serial::SerialTransport;
use crate::tcp::{TcpClientTransport, TcpServerTransport};
use crate::transport::Transport;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Default baud rate when a serial target omits one
pub const DEFAULT_BAUD: u32 = 9600;

/// Parsed target specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    Echo,
    TcpClient(SocketAddrV4),
    TcpServer(SocketAddrV4),
    Serial { path: String, baud: u32 },
}

impl TargetSpec {
    /// Parse a target specification string
    ///
    /// Returns `None` for any form this factory does not handle.
    pub fn parse(target: &str) -> Option<Self> {
        let target = target.trim();
        if target == "echo" {
            return Some(Self::Echo);
        }
        if let Some(rest) = target.strip_prefix("client:") {
            return parse_socket_addr(rest).map(Self::TcpClient);
        }
        if let Some(rest) = target.strip_prefix("server:") {
            return parse_socket_addr(rest).map(Self::TcpServer);
        }
        if let Some(rest) = target.strip_prefix("serial:") {
            return parse_serial(rest);
        }
        None
    }
}

/// Parse `<A.B.C.D>:<port>` with octets ≤ 255 and port ≤ 65535
fn parse_socket_addr(spec: &str) -> Option<SocketAddrV4> {
    let (host, port) = spec.rsplit_once(':')?;
    let ip: Ipv4Addr = host.parse().ok()?;
    let port: u16 = port.parse().ok()?;
    Some(SocketAddrV4::new(ip, port))
}

/// Parse `<path>` or `<path>:<baud>`
fn parse_serial(spec: &str) -> Option<TargetSpec> {
    if spec.is_empty() {
        return None;
    }
    // A trailing `:<digits>` is a baud rate; anything else is part of the path.
    if let Some((path, baud)) = spec.rsplit_once(':') {
        if let Ok(baud) = baud.parse::<u32>() {
            if path.is_empty() {
                return None;
            }
            return Some(TargetSpec::Serial {
                path: path.to_string(),
                baud,
            });
        }
    }
    Some(TargetSpec::Serial {
        path: spec.to_string(),
        baud: DEFAULT_BAUD,
    })
}

/// Create a transport from a target specification string
///
/// Walks the built-in factory chain (echo, TCP, serial). Returns `None` for
/// targets none of them recognize; the caller may consult further factories
/// (USB) before treating the string as invalid.
pub fn create_transport(target: &str) -> Option<Box<dyn Transport>> {
    let spec = TargetSpec::parse(target)?;
    let transport: Box<dyn Transport> = match spec {
        TargetSpec::Echo => Box::new(EchoTransport::new()),
        TargetSpec::TcpClient(addr) => Box::new(TcpClientTransport::new(target, addr)),
        TargetSpec::TcpServer(addr) => Box::new(TcpServerTransport::new(target, addr)),
        TargetSpec::Serial { path, baud } => Box::new(SerialTransport::new(target, path, baud)),
    };
    Some(transport)
}
