//! SCPI exchange error types

use common::identity::IdentityParseError;
use thiserror::Error;
use transport::TransportError;

/// Errors surfaced by SCPI exchanges
#[derive(Debug, Error)]
pub enum ScpiError {
    /// No complete response arrived within the exchange timeout
    #[error("Query timed out")]
    Timeout,

    /// Numeric retries disagree beyond the configured tolerance
    #[error("Validation failed: standard deviation {std_dev} exceeds limit {limit}")]
    ValidationFailed { std_dev: f64, limit: f64 },

    /// No attempt produced a parseable number
    #[error("Response is not numeric: {response:?}")]
    NotNumeric { response: String },

    /// Identity string could not be parsed
    #[error(transparent)]
    Identity(#[from] IdentityParseError),

    /// Underlying transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, ScpiError>;
