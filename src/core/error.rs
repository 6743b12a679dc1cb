//! Error types for the client library
//!
//! Every public operation returns [`Result`]; the variants map one-to-one onto the ways a
//! connection operation can fail.

use super::status::{Status, StatusDetail};

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Error types for connection and dependent-resource operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatabaseError {
    /// A precondition was violated by the caller
    #[error("{context}: {message}")]
    InvalidUsage {
        context: &'static str,
        message: String,
    },

    /// The native driver reported a failure on a specific call
    #[error("{context}: {call} failed: {detail}")]
    Driver {
        context: &'static str,
        call: &'static str,
        detail: StatusDetail,
    },

    /// The attached server failed a post-connect compatibility check
    #[error("{context}: Unsupported server: {message}")]
    UnsupportedServer {
        context: &'static str,
        message: String,
    },

    /// The local client library cannot talk to the attached server
    #[error("{context}: Incompatible client: {message}")]
    IncompatibleClient {
        context: &'static str,
        message: String,
    },

    /// Connection configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DatabaseError {
    /// Create an invalid usage error
    pub fn invalid_usage<S: Into<String>>(context: &'static str, msg: S) -> Self {
        DatabaseError::InvalidUsage {
            context,
            message: msg.into(),
        }
    }

    /// Create a driver error from the status of the failed call
    pub fn driver(context: &'static str, call: &'static str, status: &Status) -> Self {
        DatabaseError::Driver {
            context,
            call,
            detail: status.detail(),
        }
    }

    /// Create an unsupported server error
    pub fn unsupported_server<S: Into<String>>(context: &'static str, msg: S) -> Self {
        DatabaseError::UnsupportedServer {
            context,
            message: msg.into(),
        }
    }

    /// Create an incompatible client error
    pub fn incompatible_client<S: Into<String>>(context: &'static str, msg: S) -> Self {
        DatabaseError::IncompatibleClient {
            context,
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Config(msg.into())
    }

    /// The driver status attached to this error, if it came from a driver call
    pub fn status_detail(&self) -> Option<&StatusDetail> {
        match self {
            DatabaseError::Driver { detail, .. } => Some(detail),
            _ => None,
        }
    }

    /// Name of the operation that raised the error
    pub fn context(&self) -> Option<&'static str> {
        match self {
            DatabaseError::InvalidUsage { context, .. }
            | DatabaseError::Driver { context, .. }
            | DatabaseError::UnsupportedServer { context, .. }
            | DatabaseError::IncompatibleClient { context, .. } => Some(context),
            DatabaseError::Config(_) => None,
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        DatabaseError::Config(err.to_string())
    }
}
