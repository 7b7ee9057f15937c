//! Strata Error - Unified Error Types
//!
//! Error handling for all Strata operations. Categorizes errors by domain
//! (validation, lookup, causal delivery, placement, transport) and provides
//! utilities for determining retryability and error classification.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all Strata operations.
#[derive(Error, Debug)]
pub enum StrataError {
    // Request validation errors
    #[error("Invalid JSON format")]
    InvalidJson,

    #[error("Invalid metadata format")]
    InvalidMetadata,

    #[error("Key is too long")]
    KeyTooLong,

    #[error("PUT request does not specify a value")]
    NoValue,

    #[error("{0}")]
    BadRequest(String),

    // Lookup errors
    #[error("Key does not exist")]
    KeyNotFound,

    #[error("View has no such replica")]
    ReplicaNotFound,

    #[error("Shard does not exist")]
    ShardNotFound(String),

    #[error("Node is not assigned to a shard")]
    Unsharded,

    // Causal delivery errors
    #[error("Causal dependencies not satisfied; try again later")]
    StaleReplica,

    #[error("Causal dependencies not satisfied; try again later")]
    NotDeliverable,

    // Placement errors
    #[error("Not enough nodes to provide fault tolerance with requested shard count")]
    InsufficientNodes,

    // Transport errors
    #[error("Cannot forward request")]
    NoNodeReachable,

    #[error("transport error: {0}")]
    Transport(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;

// =============================================================================
// Error Classification
// =============================================================================

impl StrataError {
    /// Returns true if the operation can be safely retried with the same
    /// input once the rest of the system catches up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StrataError::StaleReplica
                | StrataError::NotDeliverable
                | StrataError::NoNodeReachable
                | StrataError::Transport(_)
        )
    }

    /// Returns true if this is a user error (vs system error).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            StrataError::InvalidJson
                | StrataError::InvalidMetadata
                | StrataError::KeyTooLong
                | StrataError::NoValue
                | StrataError::BadRequest(_)
                | StrataError::KeyNotFound
                | StrataError::ReplicaNotFound
                | StrataError::ShardNotFound(_)
                | StrataError::InsufficientNodes
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StrataError::StaleReplica.is_retryable());
        assert!(StrataError::NotDeliverable.is_retryable());
        assert!(StrataError::NoNodeReachable.is_retryable());
        assert!(!StrataError::KeyTooLong.is_retryable());
        assert!(!StrataError::KeyNotFound.is_retryable());
    }

    #[test]
    fn test_user_error_classification() {
        assert!(StrataError::NoValue.is_user_error());
        assert!(StrataError::InsufficientNodes.is_user_error());
        assert!(!StrataError::StaleReplica.is_user_error());
        assert!(!StrataError::Transport("refused".to_string()).is_user_error());
    }

    #[test]
    fn test_wire_messages() {
        assert_eq!(
            StrataError::StaleReplica.to_string(),
            "Causal dependencies not satisfied; try again later"
        );
        assert_eq!(StrataError::KeyTooLong.to_string(), "Key is too long");
        assert_eq!(
            StrataError::NoValue.to_string(),
            "PUT request does not specify a value"
        );
        assert_eq!(StrataError::KeyNotFound.to_string(), "Key does not exist");
    }
}
