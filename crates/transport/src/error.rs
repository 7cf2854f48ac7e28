//! Transport error types

use thiserror::Error;

/// Errors surfaced by transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation requires a live connection
    #[error("Not connected")]
    NotConnected,

    /// Connection already established or in progress
    #[error("Already connected")]
    AlreadyConnected,

    /// Wall-clock budget for the operation lapsed
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The OS accepted only part of the outbound bytes within the write budget
    #[error("Partial write: {written} of {total} bytes accepted")]
    PartialWrite { written: usize, total: usize },

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
