//! Error types for the transit pipeline
//!
//! This module provides structured error handling using thiserror.
//! Day-level failures are swallowed by the fetchers; everything else
//! propagates to the caller.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, TransitError>;

/// Errors that can occur while building a timeline
#[derive(Error, Debug)]
pub enum TransitError {
    /// IO error during cache or config file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary cache encoding error
    #[error("Cache encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// The oracle could not be reached or the connection broke
    #[error("Oracle transport error: {message}")]
    Transport { message: String },

    /// The oracle did not answer within the per-call timeout
    #[error("Oracle call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The oracle answered, but not with an OK status
    #[error("Oracle returned status {status}: {message}")]
    OracleStatus { status: String, message: String },

    /// Start date after end date
    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Assembled ephemeris batch failed structural validation
    #[error("Ephemeris validation failed: {message}")]
    Validation { message: String },

    /// Cache backend failure (callers treat this as a miss)
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TransitError>,
    },
}

impl TransitError {
    /// Wrap an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TransitError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        TransitError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        TransitError::Validation {
            message: message.into(),
        }
    }

    /// Create a cache error
    pub fn cache(message: impl Into<String>) -> Self {
        TransitError::Cache {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        TransitError::Transport {
            message: message.into(),
        }
    }

    /// Whether this failure concerns a single oracle call.
    ///
    /// Day-level failures are logged and skipped by the fetchers and
    /// never reach the caller.
    pub fn is_day_level(&self) -> bool {
        match self {
            Self::Transport { .. }
            | Self::Timeout { .. }
            | Self::OracleStatus { .. }
            | Self::Json(_) => true,
            Self::WithContext { source, .. } => source.is_day_level(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(ctx))
    }
}
