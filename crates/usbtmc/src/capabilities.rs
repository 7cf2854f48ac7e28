//! Capability negotiation
//!
//! After claiming the interface, the host issues a GET_CAPABILITIES class
//! request and records the bits that matter for session behavior: SCPI
//! support, remote-lockout support, and the indicator pulse. Devices whose
//! remote-lockout implementation is known broken are listed in a quirk table
//! and never sent REN/LLO.

use crate::error::{Result, UsbTmcError};

/// GET_CAPABILITIES class request (bRequest)
pub const GET_CAPABILITIES: u8 = 7;

/// Full capability reply length per the class specification
pub const CAPABILITIES_REPLY_LEN: usize = 24;

/// Minimum reply length carrying the USB488 capability bytes
const MIN_REPLY_LEN: usize = 16;

/// USBTMC_status value for success
const STATUS_SUCCESS: u8 = 1;

/// Negotiated capability bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Device claims SCPI command-set compliance (USB488 device bit 3)
    pub scpi: bool,
    /// Device implements RL1 remote/local lockout (USB488 device bit 1)
    pub remote_lockout: bool,
    /// Interface accepts REN_CONTROL/GO_TO_LOCAL/LOCAL_LOCKOUT requests
    /// (USB488 interface bit 1)
    pub ren_control: bool,
    /// Interface supports the INDICATOR_PULSE request (USBTMC bit 2)
    pub indicator_pulse: bool,
    /// Talk-only interface (USBTMC bit 1)
    pub talk_only: bool,
    /// Listen-only interface (USBTMC bit 0)
    pub listen_only: bool,
}

impl Capabilities {
    /// Whether the session should assert remote lockout at open
    pub fn wants_lockout(self) -> bool {
        self.remote_lockout && self.ren_control
    }
}

/// Parse a GET_CAPABILITIES reply
///
/// The reply opens with a USBTMC_status byte; anything but success, or a
/// reply too short to carry the USB488 bytes, fails the negotiation.
pub fn parse_capabilities(data: &[u8]) -> Result<Capabilities> {
    if data.len() < MIN_REPLY_LEN {
        return Err(UsbTmcError::CapabilityQuery(format!(
            "reply too short: {} of {} bytes",
            data.len(),
            MIN_REPLY_LEN
        )));
    }
    if data[0] != STATUS_SUCCESS {
        return Err(UsbTmcError::CapabilityQuery(format!(
            "device returned status {:#04x}",
            data[0]
        )));
    }

    let tmc_interface = data[4];
    let usb488_interface = data[14];
    let usb488_device = data[15];

    Ok(Capabilities {
        scpi: usb488_device & 0x08 != 0,
        remote_lockout: usb488_device & 0x02 != 0,
        ren_control: usb488_interface & 0x02 != 0,
        indicator_pulse: tmc_interface & 0x04 != 0,
        talk_only: tmc_interface & 0x02 != 0,
        listen_only: tmc_interface & 0x01 != 0,
    })
}

/// A device whose RL1 claim is known broken
///
/// `product_id == None` matches every product of the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rl1Quirk {
    pub vendor_id: u16,
    pub product_id: Option<u16>,
}

/// Quirk table consulted before asserting remote lockout
#[derive(Debug, Clone)]
pub struct QuirkList {
    entries: Vec<Rl1Quirk>,
}

impl QuirkList {
    /// Devices that advertise RL1 but wedge on LOCAL_LOCKOUT
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                // Rigol: broken across the line, match the whole vendor
                Rl1Quirk {
                    vendor_id: 0x1ab1,
                    product_id: None,
                },
                // Agilent DSO1000 series
                Rl1Quirk {
                    vendor_id: 0x0957,
                    product_id: Some(0x0588),
                },
            ],
        }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, quirk: Rl1Quirk) {
        self.entries.push(quirk);
    }

    /// Whether remote lockout must be skipped for this device
    pub fn is_quirked(&self, vendor_id: u16, product_id: u16) -> bool {
        self.entries.iter().any(|q| {
            q.vendor_id == vendor_id && q.product_id.map_or(true, |pid| pid == product_id)
        })
    }
}

impl Default for QuirkList {
    fn default() -> Self {
        Self::builtin()
    }
}
