//! Matcher error types

use thiserror::Error;

/// Errors surfaced by requirement matching
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    /// Fewer accepted candidates than the requirement's minimum; fatal to
    /// the match attempt, there is nothing for a user to choose from
    #[error(
        "Requirement '{alias}' under-defined: {found} accepted candidate(s), at least {needed} required"
    )]
    UnderDefinedRequirement {
        alias: String,
        found: u32,
        needed: u32,
    },

    /// More candidates selected than the requirement allows and no
    /// resolution has reduced the set yet
    #[error("Requirement '{alias}' ambiguous: {selected} selected, at most {max} allowed")]
    AmbiguousRequirement {
        alias: String,
        selected: u32,
        max: u32,
    },

    /// Requirement construction violated an invariant
    #[error("Invalid requirement '{alias}': {reason}")]
    InvalidRequirement { alias: String, reason: String },

    /// Resolution referenced an alias the match does not contain
    #[error("Unknown requirement alias '{0}'")]
    UnknownAlias(String),

    /// Resolution referenced a candidate that cannot be selected
    #[error("Invalid selection for '{alias}': {reason}")]
    InvalidSelection { alias: String, reason: String },
}

pub type Result<T> = std::result::Result<T, MatchError>;
