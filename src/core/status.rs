//! Per-call driver status
//!
//! A [`Status`] is handed to every driver entry point and receives the error and warning
//! information of that call. It must be reset before reuse so a stale error from a previous
//! call is never reinterpreted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured detail of a driver error or warning
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDetail {
    /// Driver-specific (GDS) error code
    pub gds_code: i64,
    /// SQL code reported alongside the GDS code
    pub sql_code: i32,
    /// Human readable message
    pub message: String,
}

impl fmt::Display for StatusDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (SQLCODE {}, GDS {})",
            self.message, self.sql_code, self.gds_code
        )
    }
}

/// Status channel for a single driver call
#[derive(Debug, Clone, Default)]
pub struct Status {
    error: Option<StatusDetail>,
    warnings: Vec<StatusDetail>,
}

impl Status {
    /// Create an empty status
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear any error or warning left by a previous call
    pub fn reset(&mut self) {
        self.error = None;
        self.warnings.clear();
    }

    /// Whether the last call produced an error
    pub fn errors(&self) -> bool {
        self.error.is_some()
    }

    /// Whether the last call produced warnings
    pub fn warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warnings reported by the last call
    pub fn warning_details(&self) -> &[StatusDetail] {
        &self.warnings
    }

    /// Record an error; called by drivers
    pub fn set_error(&mut self, gds_code: i64, sql_code: i32, message: impl Into<String>) {
        self.error = Some(StatusDetail {
            gds_code,
            sql_code,
            message: message.into(),
        });
    }

    /// Record a warning; called by drivers
    pub fn add_warning(&mut self, gds_code: i64, message: impl Into<String>) {
        self.warnings.push(StatusDetail {
            gds_code,
            sql_code: 0,
            message: message.into(),
        });
    }

    /// Detail of the recorded error, or an empty detail when the call succeeded
    pub fn detail(&self) -> StatusDetail {
        self.error.clone().unwrap_or_default()
    }
}
