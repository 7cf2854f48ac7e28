//! Common utilities for bench-link
//!
//! This crate provides functionality shared between the transport, USBTMC,
//! SCPI, and matcher crates: error handling, logging setup, instrument
//! identity parsing, and the calibration-approval boundary.

pub mod approval;
pub mod error;
pub mod identity;
pub mod logging;
pub mod test_utils;

pub use approval::{ApprovalState, ApprovalVerdict, CalibrationLookup};
pub use error::{Error, Result};
pub use identity::InstrumentIdentity;
pub use logging::setup_logging;
