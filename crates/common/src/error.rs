//! Common error types

use thiserror::Error;

/// Catch-all error used at integration seams between the subsystem crates.
///
/// Each subsystem crate (transport, usbtmc, scpi, matcher) defines its own
/// precise error enum; this type exists for code that spans several of them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("USB error: {0}")]
    Usb(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Match error: {0}")]
    Match(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
