//! Custom error types for daybook.
//!
//! Internally every operation returns [`Result`]. The public store and
//! delegation façades fold these errors into `false` / `None` / empty
//! vectors and record the message in a shared [`LastError`] slot, so
//! callers never branch on errors directly.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Main error type for daybook operations
#[derive(Error, Debug)]
pub enum DaybookError {
    // =========================================================================
    // Session Errors
    // =========================================================================
    /// No authenticated user is attached to the session
    #[error("Not authenticated")]
    NotAuthenticated,

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    /// Requested record is absent
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// The persistent store rejected or failed an operation
    #[error("Store error during {operation}: {message}")]
    Store { operation: String, message: String },

    /// Caller supplied an unusable value
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// SQLite error wrapper
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// TOML parse error wrapper
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DaybookError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a not-found error
    pub fn not_found(what: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// Create a store error
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this is a missing-session error
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }

    /// Check if this is a not-found outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error came from the persistent store
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Sqlite(_) | Self::Io(_))
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotAuthenticated => 2,
            Self::NotFound { .. } => 3,
            Self::InvalidInput { .. } => 4,
            Self::Config { .. } | Self::InvalidConfig { .. } | Self::Toml(_) => 7,
            _ => 1,
        }
    }
}

/// Type alias for daybook results
pub type Result<T> = std::result::Result<T, DaybookError>;

/// Extension trait for converting foreign errors into store errors
pub trait IntoDaybookError<T> {
    fn into_store_error(self, operation: &str) -> Result<T>;
    fn into_config_error(self) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoDaybookError<T> for std::result::Result<T, E> {
    fn into_store_error(self, operation: &str) -> Result<T> {
        self.map_err(|e| DaybookError::store(operation, e.into().to_string()))
    }

    fn into_config_error(self) -> Result<T> {
        self.map_err(|e| DaybookError::config(e.into().to_string()))
    }
}

/// Shared slot holding the most recent write failure for display.
///
/// Cloning shares the slot. Never authoritative for control flow.
#[derive(Debug, Clone, Default)]
pub struct LastError(Arc<Mutex<Option<String>>>);

impl LastError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error message, replacing any previous one.
    pub fn set(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(message.into());
        }
    }

    /// Current message, if any.
    pub fn get(&self) -> Option<String> {
        self.0.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = None;
        }
    }
}
