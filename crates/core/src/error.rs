//! Error types for the Engram memory store.
//!
//! `EngramError` is the unified error type for every public API. We use
//! `thiserror` for `Display` and `Error` derivation.
//!
//! ## Error Categories
//!
//! - **InvalidArg**: bad input; fix the call, do not retry
//! - **NotFound**: the referenced entity does not exist
//! - **Conflict**: the operation collides with existing state
//! - **Forbidden**: the operation is never allowed (e.g. deleting "main")
//! - **Integrity**: hash chain, Merkle, or version-sequence violation
//! - **Unavailable**: the write-ahead log could not be persisted
//! - **Serialization**: encode/decode failure
//! - **Internal**: a bug; the store should be reopened and replayed

use std::io;
use thiserror::Error;

/// Result type alias for Engram operations.
pub type Result<T> = std::result::Result<T, EngramError>;

/// Unified error type for all Engram operations.
#[derive(Debug, Error)]
pub enum EngramError {
    /// The input is invalid. Not retryable; the arguments must change.
    #[error("invalid argument: {message}")]
    InvalidArg {
        /// What is wrong with the input
        message: String,
    },

    /// The referenced entity does not exist (or is tombstoned).
    #[error("not found: {kind} {id}")]
    NotFound {
        /// Entity kind ("memory", "relationship", "store", "snapshot")
        kind: &'static str,
        /// The identifier that failed to resolve
        id: String,
    },

    /// The operation collides with existing state, e.g. a duplicate
    /// live relationship on the same `(from, to)` pair.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the collision
        message: String,
    },

    /// The operation is categorically rejected, e.g. deleting "main".
    #[error("forbidden: {message}")]
    Forbidden {
        /// Why the operation is never allowed
        message: String,
    },

    /// Hash-chain, Merkle, or version-sequence verification failed.
    ///
    /// Integrity failures are reported, never silently repaired;
    /// `rebuild_indexes` is the explicit recovery command.
    #[error("integrity error: {message}")]
    Integrity {
        /// Description of the divergence
        message: String,
    },

    /// The write-ahead log could not be persisted (fsync error, disk
    /// full). The record is not committed and no index was touched.
    #[error("unavailable: {message}")]
    Unavailable {
        /// What failed
        message: String,
        /// Underlying I/O error, when there is one
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to encode or decode data.
    #[error("serialization error: {message}")]
    Serialization {
        /// What went wrong
        message: String,
    },

    /// An unexpected internal state. Indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl EngramError {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create an InvalidArg error.
    pub fn invalid_arg(message: impl Into<String>) -> Self {
        EngramError::InvalidArg {
            message: message.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngramError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create a Conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        EngramError::Conflict {
            message: message.into(),
        }
    }

    /// Create a Forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        EngramError::Forbidden {
            message: message.into(),
        }
    }

    /// Create an Integrity error.
    pub fn integrity(message: impl Into<String>) -> Self {
        EngramError::Integrity {
            message: message.into(),
        }
    }

    /// Create an Unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        EngramError::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create an Unavailable error with an underlying cause.
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        EngramError::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a Serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        EngramError::Serialization {
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        EngramError::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// True for `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngramError::NotFound { .. })
    }

    /// True for `Conflict`.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngramError::Conflict { .. })
    }

    /// True for `InvalidArg`.
    pub fn is_invalid_arg(&self) -> bool {
        matches!(self, EngramError::InvalidArg { .. })
    }

    /// True for `Integrity`.
    pub fn is_integrity(&self) -> bool {
        matches!(self, EngramError::Integrity { .. })
    }

    /// Serious errors indicate corruption or a bug. These should be
    /// logged and investigated, never retried.
    pub fn is_serious(&self) -> bool {
        matches!(
            self,
            EngramError::Integrity { .. } | EngramError::Internal { .. }
        )
    }

    /// Stable machine-readable kind, for transports that wrap errors as
    /// `{error: <kind>, message: ...}`.
    pub fn kind(&self) -> &'static str {
        match self {
            EngramError::InvalidArg { .. } => "invalid_arg",
            EngramError::NotFound { .. } => "not_found",
            EngramError::Conflict { .. } => "conflict",
            EngramError::Forbidden { .. } => "forbidden",
            EngramError::Integrity { .. } => "integrity_error",
            EngramError::Unavailable { .. } => "unavailable",
            EngramError::Serialization { .. } => "serialization",
            EngramError::Internal { .. } => "internal",
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<io::Error> for EngramError {
    fn from(e: io::Error) -> Self {
        EngramError::Unavailable {
            message: format!("I/O error: {}", e),
            source: Some(Box::new(e)),
        }
    }
}

impl From<serde_json::Error> for EngramError {
    fn from(e: serde_json::Error) -> Self {
        EngramError::Serialization {
            message: format!("JSON error: {}", e),
        }
    }
}

impl From<bincode::Error> for EngramError {
    fn from(e: bincode::Error) -> Self {
        EngramError::Serialization {
            message: e.to_string(),
        }
    }
}
