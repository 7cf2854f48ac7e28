//! SCPI request/response exchange for bench-link
//!
//! Drives text command/query cycles over any [`transport::Transport`]:
//! terminator handling, timeout-bounded reads re-armed on partial progress,
//! bounded retry with statistical validation of numeric answers, and
//! asynchronous event-string tracking.

pub mod config;
pub mod error;
pub mod exchange;

pub use config::ExchangeConfig;
pub use error::{Result, ScpiError};
pub use exchange::ScpiExchange;
