//! Candidates and the acceptance-predicate boundary

use crate::protocol::Protocol;
use common::identity::InstrumentIdentity;
use serde::{Deserialize, Serialize};

/// Read-only device view handed to acceptance predicates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Protocol kind name (see [`Protocol::kind_name`])
    pub protocol_name: String,
    /// Protocol-reported device name (typically the identity model)
    pub device_name: String,
    /// Parsed identity, when the device reported one
    pub identity: Option<InstrumentIdentity>,
    /// Transport target specification, for diagnostics
    pub target: String,
}

/// Acceptance verdict for one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Passed the approval gate and the acceptance predicate
    Accepted,
    /// Excluded, with a human-readable diagnostic
    Rejected(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// One candidate of a match entry
#[derive(Debug)]
pub struct CandidateDevice {
    pub descriptor: DeviceDescriptor,
    pub(crate) protocol: Protocol,
    /// Whether this candidate is currently chosen for its requirement
    pub selected: bool,
    pub verdict: Verdict,
}

impl CandidateDevice {
    /// The device's protocol, with its transport inside
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }
}

/// Acceptance predicate (scripting collaborator boundary)
///
/// Returns `None` to accept, or a human-readable rejection reason. An `Err`
/// from the predicate itself is caught at the matcher boundary and surfaced
/// as a rejection diagnostic, never propagated and never silently dropped.
pub trait AcceptancePolicy: Send + Sync {
    fn evaluate(&self, descriptor: &DeviceDescriptor) -> anyhow::Result<Option<String>>;
}

/// Policy that accepts every candidate
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl AcceptancePolicy for AcceptAll {
    fn evaluate(&self, _descriptor: &DeviceDescriptor) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

/// Adapter turning a plain function into an acceptance policy
pub struct FnPolicy<F>(pub F);

impl<F> AcceptancePolicy for FnPolicy<F>
where
    F: Fn(&DeviceDescriptor) -> anyhow::Result<Option<String>> + Send + Sync,
{
    fn evaluate(&self, descriptor: &DeviceDescriptor) -> anyhow::Result<Option<String>> {
        (self.0)(descriptor)
    }
}
