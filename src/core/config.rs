//! Connection identity and parameters
//!
//! A [`ConnectionConfig`] holds everything needed to attach to (or create) a database:
//! server, database path, credentials, role, character set and extra creation
//! parameters. It can be built in code or loaded from JSON.

use super::error::{DatabaseError, Result};
use serde::{Deserialize, Serialize};

/// Identity and parameters of one database connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server host; empty for a local connection
    pub server: String,
    /// Database path or alias
    pub database: String,
    pub user: String,
    /// Never written back out when the configuration is serialized
    #[serde(skip_serializing)]
    pub password: String,
    /// SQL role to assume after attaching
    pub role: String,
    /// Connection character set
    pub charset: String,
    /// Extra clauses appended to `CREATE DATABASE`
    pub create_params: String,
}

impl ConnectionConfig {
    /// Create a configuration for the given database
    pub fn new<S: Into<String>>(database: S) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON
    ///
    /// # Errors
    ///
    /// Returns `Config` if the document is not a valid configuration object.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the server host
    pub fn server<S: Into<String>>(mut self, server: S) -> Self {
        self.server = server.into();
        self
    }

    /// Set the user name
    pub fn user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = user.into();
        self
    }

    /// Set the password
    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = password.into();
        self
    }

    /// Set the SQL role
    pub fn role<S: Into<String>>(mut self, role: S) -> Self {
        self.role = role.into();
        self
    }

    /// Set the connection character set
    pub fn charset<S: Into<String>>(mut self, charset: S) -> Self {
        self.charset = charset.into();
        self
    }

    /// Set extra `CREATE DATABASE` clauses
    pub fn create_params<S: Into<String>>(mut self, params: S) -> Self {
        self.create_params = params.into();
        self
    }

    /// Check the fields every attach or create needs
    pub(crate) fn require_identity(&self, context: &'static str) -> Result<()> {
        if self.database.is_empty() {
            return Err(DatabaseError::invalid_usage(
                context,
                "Unspecified database name.",
            ));
        }
        if self.user.is_empty() {
            return Err(DatabaseError::invalid_usage(context, "Unspecified user name."));
        }
        Ok(())
    }
}
