//! Error types for livemeta
//!
//! All layers share this one error enum.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// livemeta error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Source units
    // ========================================================================
    #[error("Failed to load source unit {unit}: {message}")]
    Load { unit: String, message: String },

    #[error("Source unit not found: {0}")]
    UnitNotFound(String),

    #[error("Watch error: {0}")]
    Watch(String),

    // ========================================================================
    // Registry
    // ========================================================================
    /// Initialization failed. The source is shared so every caller waiting on
    /// the same init attempt receives the same outcome.
    #[error("Registry '{registry}' failed to initialize: {source}")]
    Init {
        registry: String,
        #[source]
        source: Arc<Error>,
    },

    #[error("Registry '{registry}' has been dropped")]
    RegistryDropped { registry: String },

    #[error("Duplicate entity id {id}: defined by {existing} and {incoming}")]
    DuplicateId {
        id: String,
        existing: String,
        incoming: String,
    },

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Other
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Load failure helper
    pub fn load(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Load {
            unit: unit.into(),
            message: message.into(),
        }
    }

    /// Wrap an init failure so it can be handed to several waiters
    pub fn init(registry: impl Into<String>, source: Error) -> Self {
        Error::Init {
            registry: registry.into(),
            source: Arc::new(source),
        }
    }

    /// Innermost error of an init chain
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Init { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether a later `init()` call may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Init { .. } | Error::Load { .. } | Error::Io(_))
    }

    /// Errors that the change source swallows instead of propagating
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Error::Load { .. } | Error::UnitNotFound(_))
    }
}

// ============================================================================
// From conversions
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
