//! Error types for ModelSync.
//!
//! All errors in ModelSync are strongly typed using thiserror.
//! Store failures live next to the store contract in `crate::storage`;
//! this module holds the mapping, decoding and transport taxonomies and
//! the top-level [`SyncError`] that every load failure is reported with.

use thiserror::Error;

use crate::entity::EntityType;
use crate::mapping::PayloadFormat;
use crate::storage::StoreError;

/// Errors raised when a payload violates a mapping descriptor.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{entity_type}: remote primary key element '{field}' is missing")]
    MissingPrimaryKey {
        entity_type: EntityType,
        field: String,
    },

    #[error("{entity_type}: element '{element}' expected {expected}, found {actual}")]
    TypeMismatch {
        entity_type: EntityType,
        element: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{entity_type}: malformed relationship '{path}': {reason}")]
    MalformedRelationship {
        entity_type: EntityType,
        path: String,
        reason: String,
    },

    #[error("No mapping descriptor registered for entity type '{0}'")]
    UnregisteredEntityType(EntityType),

    #[error("Invalid mapping descriptor for '{entity_type}': {reason}")]
    InvalidDescriptor {
        entity_type: EntityType,
        reason: String,
    },
}

/// Errors raised when a payload cannot be decoded into an attribute tree.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed {format} payload: {message}")]
    Malformed {
        format: PayloadFormat,
        message: String,
    },

    #[error("Payload of {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    #[error("No decoder available for {0} payloads")]
    UnsupportedFormat(PayloadFormat),
}

/// Transport errors. Opaque to the core and passed through unchanged.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
    },

    #[error("Server responded with status {code}: {message}")]
    Status {
        code: u16,
        message: String,
    },

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Other(String),
}

/// Top-level error type for ModelSync.
///
/// Every failed load cycle is reported to its delegate with exactly one of
/// these.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SyncError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a store error.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Returns true if this is a mapping error.
    #[must_use]
    pub const fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping(_))
    }

    /// Returns true if this is a decode error.
    #[must_use]
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if a caller could reasonably retry the load.
    ///
    /// The core itself never retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => match e {
                TransportError::ConnectionFailed { .. } => true,
                TransportError::Status { code, .. } => *code >= 500,
                _ => false,
            },
            Self::Store(_) | Self::Mapping(_) | Self::Decode(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for ModelSync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_error_missing_primary_key() {
        let err = MappingError::MissingPrimaryKey {
            entity_type: EntityType::new("User"),
            field: "id".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("User"));
        assert!(msg.contains("'id'"));
    }

    #[test]
    fn test_mapping_error_type_mismatch() {
        let err = MappingError::TypeMismatch {
            entity_type: EntityType::new("Post"),
            element: "title".to_string(),
            expected: "string",
            actual: "object",
        };
        let msg = format!("{err}");
        assert!(msg.contains("expected string"));
        assert!(msg.contains("found object"));
    }

    #[test]
    fn test_decode_error_too_large() {
        let err = DecodeError::PayloadTooLarge { size: 10, max: 5 };
        let msg = format!("{err}");
        assert!(msg.contains("10 bytes"));
        assert!(msg.contains("5 bytes"));
    }

    #[test]
    fn test_sync_error_from_mapping() {
        let err: SyncError = MappingError::UnregisteredEntityType(EntityType::new("Ghost")).into();
        assert!(err.is_mapping());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_sync_error_from_store() {
        let err: SyncError = StoreError::Backend("poisoned".to_string()).into();
        assert!(err.is_store());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_sync_error_retryable() {
        let err: SyncError = TransportError::ConnectionFailed {
            message: "refused".to_string(),
        }
        .into();
        assert!(err.is_transport());
        assert!(err.is_retryable());

        let err: SyncError = TransportError::Status {
            code: 503,
            message: "unavailable".to_string(),
        }
        .into();
        assert!(err.is_retryable());

        let err: SyncError = TransportError::Status {
            code: 404,
            message: "missing".to_string(),
        }
        .into();
        assert!(!err.is_retryable());

        let err: SyncError = TransportError::Cancelled.into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_sync_error_internal() {
        let err = SyncError::internal("unexpected state");
        assert!(err.is_internal());
        let msg = format!("{err}");
        assert!(msg.contains("unexpected state"));
    }
}
