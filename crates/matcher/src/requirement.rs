//! Device requirements and quantity-window classification

use crate::error::{MatchError, Result};
use serde::{Deserialize, Serialize};

/// A device requirement declared by a test program
///
/// Asks for between `quantity_min` and `quantity_max` devices speaking
/// `protocol_name`, optionally restricted to a set of device names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRequirement {
    /// Name the test program refers to the allocation by
    pub alias: String,
    /// Protocol kind the devices must speak (see [`crate::Protocol`])
    pub protocol_name: String,
    /// Acceptable device names; empty means any
    #[serde(default)]
    pub name_filters: Vec<String>,
    quantity_min: u32,
    quantity_max: u32,
}

impl DeviceRequirement {
    /// Create a requirement; `quantity_min` must not exceed `quantity_max`
    pub fn new(
        alias: impl Into<String>,
        protocol_name: impl Into<String>,
        quantity_min: u32,
        quantity_max: u32,
    ) -> Result<Self> {
        let alias = alias.into();
        if quantity_min > quantity_max {
            return Err(MatchError::InvalidRequirement {
                alias,
                reason: format!(
                    "quantity_min {} exceeds quantity_max {}",
                    quantity_min, quantity_max
                ),
            });
        }
        Ok(Self {
            alias,
            protocol_name: protocol_name.into(),
            name_filters: Vec::new(),
            quantity_min,
            quantity_max,
        })
    }

    /// Shorthand for exactly-one-device requirements
    pub fn single(alias: impl Into<String>, protocol_name: impl Into<String>) -> Self {
        Self::new(alias, protocol_name, 1, 1).expect("1..=1 is a valid window")
    }

    pub fn with_name_filters(mut self, filters: Vec<String>) -> Self {
        self.name_filters = filters;
        self
    }

    pub fn quantity_min(&self) -> u32 {
        self.quantity_min
    }

    pub fn quantity_max(&self) -> u32 {
        self.quantity_max
    }

    /// Whether a protocol-reported device name passes the filter set
    pub fn accepts_name(&self, name: &str) -> bool {
        self.name_filters.is_empty() || self.name_filters.iter().any(|f| f == name)
    }
}

/// Classification of a requirement against its selected candidate count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchState {
    /// Fewer selected than the minimum, nothing to choose from
    UnderDefined,
    /// Selected count inside the quantity window
    FullDefined,
    /// More selected than the maximum, needs human resolution
    OverDefined,
}

/// Pure classification of `selected_count` against the quantity window
pub fn classify(requirement: &DeviceRequirement, selected_count: u32) -> MatchState {
    if selected_count < requirement.quantity_min {
        MatchState::UnderDefined
    } else if selected_count > requirement.quantity_max {
        MatchState::OverDefined
    } else {
        MatchState::FullDefined
    }
}
