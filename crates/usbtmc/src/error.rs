//! USBTMC error types

use thiserror::Error;

/// Framing violations detected on the bulk-in path
///
/// A framing error aborts the current read/write cycle but leaves the
/// session open; whether to close and reopen after repeated violations is
/// the caller's decision.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("response header truncated: {len} of 12 bytes")]
    ShortHeader { len: usize },

    #[error("unexpected message ID {got:#04x}")]
    UnexpectedMsgId { got: u8 },

    #[error("sequence tag mismatch: sent {expected}, response carries {got}")]
    TagMismatch { expected: u8, got: u8 },

    #[error("tag complement check failed: tag {tag:#04x}, complement {complement:#04x}")]
    BadTagComplement { tag: u8, complement: u8 },
}

/// Errors surfaced by USBTMC operations
#[derive(Debug, Error)]
pub enum UsbTmcError {
    /// Device enumeration, open, or interface claim failed
    #[error("USBTMC device not found or not claimable: {0}")]
    DeviceNotFound(String),

    /// Bulk response violated the framing protocol
    #[error("Protocol framing error: {0}")]
    Framing(#[from] FramingError),

    /// Capability negotiation failed
    #[error("GET_CAPABILITIES failed: {0}")]
    CapabilityQuery(String),

    /// A previous response is only partially consumed
    #[error("Session busy: previous response not fully drained")]
    Busy,

    /// Session is not open
    #[error("Session closed")]
    Closed,

    /// Bulk transfer exceeded its fixed per-call budget
    #[error("USB transfer timed out")]
    Timeout,

    /// The worker thread is gone
    #[error("USB worker channel closed")]
    ChannelClosed,

    /// Any other libusb failure
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

pub type Result<T> = std::result::Result<T, UsbTmcError>;

/// Map a rusb transfer error, separating the timeout case
///
/// Timeouts are reported distinctly so callers polling for data can treat
/// them as "nothing arrived" rather than a fault.
pub fn map_transfer_error(err: rusb::Error) -> UsbTmcError {
    match err {
        rusb::Error::Timeout => UsbTmcError::Timeout,
        other => UsbTmcError::Usb(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_separated() {
        assert!(matches!(
            map_transfer_error(rusb::Error::Timeout),
            UsbTmcError::Timeout
        ));
        assert!(matches!(
            map_transfer_error(rusb::Error::Pipe),
            UsbTmcError::Usb(rusb::Error::Pipe)
        ));
    }

    #[test]
    fn test_framing_error_display() {
        let err = UsbTmcError::Framing(FramingError::TagMismatch {
            expected: 5,
            got: 7,
        });
        let msg = format!("{}", err);
        assert!(msg.contains("sent 5"));
        assert!(msg.contains("carries 7"));
    }
}
