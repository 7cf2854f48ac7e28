//! Device requirement matching for bench-link
//!
//! Given the live devices discovered on the bench and the device
//! requirements a test program declares, the matcher computes which devices
//! satisfy which requirement: protocol and name filtering, the
//! calibration-approval gate, user-supplied acceptance predicates, and
//! quantity-window classification with over-definition resolved by a human
//! collaborator (as data in, data out, no rendering here).

pub mod candidate;
pub mod error;
pub mod matching;
pub mod protocol;
pub mod requirement;

pub use candidate::{
    AcceptAll, AcceptancePolicy, CandidateDevice, DeviceDescriptor, FnPolicy, Verdict,
};
pub use error::{MatchError, Result};
pub use matching::{AvailableDevice, MatchEntry, MatchSession, MatchedDevice, Matcher};
pub use protocol::{ManualProtocol, Protocol, RpcProtocol};
pub use requirement::{DeviceRequirement, MatchState, classify};
