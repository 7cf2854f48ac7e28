//! Test utilities for bench-link
//!
//! Provides mock constructors and helper values used by tests across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::mock_identity;
//!
//! let id = mock_identity("SN000042");
//! assert_eq!(id.serial, "SN000042");
//! ```

use crate::approval::{ApprovalState, ApprovalVerdict, CalibrationLookup};
use crate::identity::InstrumentIdentity;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock instrument identity with the given serial number
pub fn mock_identity(serial: &str) -> InstrumentIdentity {
    InstrumentIdentity {
        manufacturer: "Test Instruments".to_string(),
        model: "TI-1000".to_string(),
        serial: serial.to_string(),
        firmware: "0.9.1".to_string(),
    }
}

/// Calibration lookup returning a fixed state for every serial number
///
/// Useful to exercise the matcher's approval gate without a metadata store.
#[derive(Debug, Clone, Copy)]
pub struct FixedApproval(pub ApprovalState);

impl CalibrationLookup for FixedApproval {
    fn approval(&self, identity: &InstrumentIdentity, _device_type: &str) -> ApprovalVerdict {
        ApprovalVerdict {
            state: self.0,
            summary: format!("fixed test verdict for {}", identity.serial),
        }
    }
}
