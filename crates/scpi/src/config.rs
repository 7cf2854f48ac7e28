//! Exchange tunables

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-exchange configuration
///
/// Defaults fit newline-terminated instruments on a quiet bench; serial
/// instruments with `\r` terminators or slow measurement cycles override the
/// relevant fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Appended to every outbound command
    #[serde(default = "ExchangeConfig::default_terminator")]
    pub terminator: String,

    /// Byte marking the end of an inbound message
    #[serde(default = "ExchangeConfig::default_escape")]
    pub escape: u8,

    /// Inbound messages starting with this prefix are events, not responses
    #[serde(default = "ExchangeConfig::default_event_prefix")]
    pub event_prefix: String,

    /// Per-exchange timeout; re-armed whenever new bytes arrive
    #[serde(default = "ExchangeConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    /// Additional transmissions a numeric query may use
    #[serde(default = "ExchangeConfig::default_retries")]
    pub retries_per_transmission: u32,

    /// Largest acceptable sample standard deviation across numeric retries
    #[serde(default = "ExchangeConfig::default_max_std_dev")]
    pub max_standard_deviation: f64,
}

impl ExchangeConfig {
    fn default_terminator() -> String {
        "\n".to_string()
    }

    fn default_escape() -> u8 {
        b'\n'
    }

    fn default_event_prefix() -> String {
        "EVENT:".to_string()
    }

    fn default_timeout_ms() -> u64 {
        1000
    }

    fn default_retries() -> u32 {
        2
    }

    fn default_max_std_dev() -> f64 {
        0.1
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            terminator: Self::default_terminator(),
            escape: Self::default_escape(),
            event_prefix: Self::default_event_prefix(),
            timeout_ms: Self::default_timeout_ms(),
            retries_per_transmission: Self::default_retries(),
            max_standard_deviation: Self::default_max_std_dev(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExchangeConfig::default();
        assert_eq!(config.terminator, "\n");
        assert_eq!(config.escape, b'\n');
        assert_eq!(config.timeout(), Duration::from_millis(1000));
        assert_eq!(config.retries_per_transmission, 2);
        assert!((config.max_standard_deviation - 0.1).abs() < f64::EPSILON);
    }
}
