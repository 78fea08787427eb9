//! Activation decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Decision state of an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Decision {
    /// Part of the interpretation
    Selected,
    /// Rejected from the interpretation
    Excluded,
    /// Not decided on the current search path
    #[default]
    Unknown,
}

impl Decision {
    /// Single-character symbol used in diagnostic dumps.
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Decision::Selected => 'S',
            Decision::Excluded => 'E',
            Decision::Unknown => 'U',
        }
    }

    /// Check whether a decision has been made.
    #[must_use]
    pub const fn is_decided(self) -> bool {
        !matches!(self, Decision::Unknown)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Decision::Selected => "SELECTED",
            Decision::Excluded => "EXCLUDED",
            Decision::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}
