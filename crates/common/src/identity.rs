//! Instrument identity parsing
//!
//! SCPI instruments answer `*IDN?` with a four-field comma-separated string:
//! `<manufacturer>,<model>,<serial>,<firmware>`. The parsed record is what
//! the matcher hands to the calibration-approval lookup and to acceptance
//! predicates; nothing here judges the answer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parsed instrument identity
///
/// All fields are kept verbatim apart from surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentIdentity {
    /// Manufacturer name (first identity field)
    pub manufacturer: String,
    /// Model designation (second identity field)
    pub model: String,
    /// Serial number used for calibration-record lookup
    pub serial: String,
    /// Firmware/revision string (fourth identity field)
    pub firmware: String,
}

/// Error parsing an identity string
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Malformed identity string: expected 4 comma-separated fields, got {fields} in {raw:?}")]
pub struct IdentityParseError {
    /// Number of fields found
    pub fields: usize,
    /// The offending input
    pub raw: String,
}

impl InstrumentIdentity {
    /// Parse a `*IDN?`-style response
    ///
    /// Accepts exactly four comma-separated fields. Additional commas inside
    /// the firmware field are tolerated (everything after the third comma is
    /// the firmware string, which some instruments subdivide further).
    pub fn parse(raw: &str) -> Result<Self, IdentityParseError> {
        let mut parts = raw.trim().splitn(4, ',');

        let manufacturer = parts.next().unwrap_or_default().trim();
        let model = parts.next();
        let serial = parts.next();
        let firmware = parts.next();

        match (model, serial, firmware) {
            (Some(model), Some(serial), Some(firmware)) if !manufacturer.is_empty() => Ok(Self {
                manufacturer: manufacturer.to_string(),
                model: model.trim().to_string(),
                serial: serial.trim().to_string(),
                firmware: firmware.trim().to_string(),
            }),
            _ => Err(IdentityParseError {
                fields: raw.trim().split(',').filter(|f| !f.trim().is_empty()).count(),
                raw: raw.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for InstrumentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} (S/N {}, fw {})",
            self.manufacturer, self.model, self.serial, self.firmware
        )
    }
}
