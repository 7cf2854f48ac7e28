//! Calibration-approval boundary
//!
//! Calibration records live outside this workspace (a metadata store owned by
//! the shell application). The matcher only needs a verdict per serial
//! number, so the boundary is a single lookup trait returning an approval
//! state plus a human-readable summary.

use crate::identity::InstrumentIdentity;
use serde::{Deserialize, Serialize};

/// Approval state of a device's calibration record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalState {
    /// No record found for this serial number
    Unknown,
    /// Calibrated and approved for use
    Approved,
    /// Administratively locked out
    Locked,
    /// Calibration interval has lapsed
    Expired,
}

impl ApprovalState {
    /// Whether a device in this state may be offered to the matcher
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl std::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Approved => "approved",
            Self::Locked => "locked",
            Self::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Approval state plus the record's human-readable summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalVerdict {
    pub state: ApprovalState,
    /// One-line summary for diagnostics (calibration date, lock reason, ...)
    pub summary: String,
}

impl ApprovalVerdict {
    pub fn unknown() -> Self {
        Self {
            state: ApprovalState::Unknown,
            summary: "no calibration record".to_string(),
        }
    }
}

/// Calibration/approval lookup (metadata collaborator boundary)
///
/// Implementations query whatever store the shell application persists
/// device metadata in. The lookup is keyed by serial number and device-type
/// name; it must not block for long (the matcher calls it per candidate).
pub trait CalibrationLookup: Send + Sync {
    /// Look up the approval verdict for a device
    fn approval(&self, identity: &InstrumentIdentity, device_type: &str) -> ApprovalVerdict;
}

/// Lookup that approves everything, for benches without a metadata store
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproveAll;

impl CalibrationLookup for ApproveAll {
    fn approval(&self, _identity: &InstrumentIdentity, _device_type: &str) -> ApprovalVerdict {
        ApprovalVerdict {
            state: ApprovalState::Approved,
            summary: "approval lookup disabled".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_approved_is_usable() {
        assert!(ApprovalState::Approved.is_usable());
        assert!(!ApprovalState::Unknown.is_usable());
        assert!(!ApprovalState::Locked.is_usable());
        assert!(!ApprovalState::Expired.is_usable());
    }

    #[test]
    fn test_approve_all() {
        let id = InstrumentIdentity::parse("Acme,PSU-1,SN1,1.0").unwrap();
        let verdict = ApproveAll.approval(&id, "power-supply");
        assert_eq!(verdict.state, ApprovalState::Approved);
    }
}
