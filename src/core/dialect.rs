//! SQL dialect definitions
//!
//! A database negotiates one of two SQL dialects at connect time.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
#[derive(Default)]
pub enum Dialect {
    /// Legacy dialect: double-quoted strings, DATE carries a time part
    V1 = 1,
    /// Current dialect: quoted identifiers, exact 64-bit numerics
    #[default]
    V3 = 3,
}

impl Dialect {
    /// Map a numeric dialect reported by the server or passed by a caller
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Dialect::V1),
            3 => Some(Dialect::V3),
            _ => None,
        }
    }

    /// Numeric value sent to the driver
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Convert dialect to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            Dialect::V1 => "1",
            Dialect::V3 => "3",
        }
    }

    /// Whether double quotes delimit identifiers rather than strings
    pub fn quoted_identifiers(&self) -> bool {
        matches!(self, Dialect::V3)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dialect {}", self.to_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i32>()
            .ok()
            .and_then(Dialect::from_code)
            .ok_or_else(|| format!("Invalid SQL dialect: '{}'", s))
    }
}
