//! Protocol variants a matched device can speak
//!
//! Dispatch over protocol kind is a tagged variant rather than runtime type
//! inspection: the matcher compares `kind_name` strings and capability
//! flags, never downcasts. Each communicating variant owns its transport
//! (inside the exchange); there is no shared handle to release separately.

use common::identity::InstrumentIdentity;
use scpi::ScpiExchange;

/// A human-operated instrument with no communication link
#[derive(Debug, Clone)]
pub struct ManualProtocol {
    /// Name the operator knows the instrument by
    pub device_name: String,
    /// Identity transcribed from the nameplate, when available
    pub identity: Option<InstrumentIdentity>,
}

/// An instrument controlled through an external RPC service
#[derive(Debug, Clone)]
pub struct RpcProtocol {
    pub device_name: String,
    /// Endpoint the RPC collaborator dials
    pub endpoint: String,
}

/// The protocols the matcher can allocate
pub enum Protocol {
    /// Text SCPI over TCP or serial
    Scpi(ScpiExchange),
    /// SCPI-speaking frequency counter on a USB bulk pair
    UsbtmcCounter(ScpiExchange),
    /// Operator-driven instrument, no comm link
    Manual(ManualProtocol),
    /// RPC-bridged instrument
    Rpc(RpcProtocol),
}

impl Protocol {
    /// Stable protocol kind name used in requirement matching
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scpi(_) => "scpi",
            Self::UsbtmcCounter(_) => "usbtmc-counter",
            Self::Manual(_) => "manual",
            Self::Rpc(_) => "rpc",
        }
    }

    /// Whether allocation requires an approved calibration record
    ///
    /// SCPI-driven and manual instruments produce measurement data and are
    /// gated on approval; the counter and RPC bridges carry their own
    /// qualification downstream.
    pub fn needs_approval(&self) -> bool {
        matches!(self, Self::Scpi(_) | Self::Manual(_))
    }

    /// The exchange, for protocols that communicate
    pub fn exchange_mut(&mut self) -> Option<&mut ScpiExchange> {
        match self {
            Self::Scpi(exchange) | Self::UsbtmcCounter(exchange) => Some(exchange),
            Self::Manual(_) | Self::Rpc(_) => None,
        }
    }
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scpi(e) => f
                .debug_struct("Scpi")
                .field("target", &e.transport().target())
                .finish(),
            Self::UsbtmcCounter(e) => f
                .debug_struct("UsbtmcCounter")
                .field("target", &e.transport().target())
                .finish(),
            Self::Manual(m) => f.debug_struct("Manual").field("name", &m.device_name).finish(),
            Self::Rpc(r) => f
                .debug_struct("Rpc")
                .field("name", &r.device_name)
                .field("endpoint", &r.endpoint)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_and_approval_gate() {
        let manual = Protocol::Manual(ManualProtocol {
            device_name: "HP 3458A".to_string(),
            identity: None,
        });
        assert_eq!(manual.kind_name(), "manual");
        assert!(manual.needs_approval());

        let rpc = Protocol::Rpc(RpcProtocol {
            device_name: "chamber".to_string(),
            endpoint: "tcp://10.0.0.9:7001".to_string(),
        });
        assert_eq!(rpc.kind_name(), "rpc");
        assert!(!rpc.needs_approval());
    }
}
