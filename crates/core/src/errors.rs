//! Error types for the dirlookup core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Directory errors
// ---------------------------------------------------------------------------

/// Errors from the directory session, the filter escaper and the transport.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The server could not be reached or the transport broke down.
    #[error("directory connection to {url} failed: {detail}")]
    Connection { url: String, detail: String },

    /// The server refused the simple bind.
    #[error("directory bind rejected for '{identity}': {detail}")]
    BindRejected { identity: String, detail: String },

    /// The server rejected or failed a search request.
    #[error("directory search under '{base}' with filter {filter} failed: {detail}")]
    Search {
        base: String,
        filter: String,
        detail: String,
    },

    /// An operation needed a session but none is open.
    #[error("no active directory session for {operation}")]
    NoSession { operation: String },

    /// The provider reported a failure while closing the session.
    #[error("directory unbind failed: {0}")]
    Unbind(String),

    /// Filter input could not be decoded with the requested encoding.
    #[error("filter value is not valid {encoding}: {detail}")]
    InvalidEncoding { encoding: String, detail: String },
}

impl DirectoryError {
    pub(crate) fn no_session(operation: impl Into<String>) -> Self {
        Self::NoSession {
            operation: operation.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
