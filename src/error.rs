//! Error types for acltree

use thiserror::Error;

use crate::registry::Role;

/// The main error type for acltree operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    /// Misconfiguration: bad config values, malformed strategy settings
    #[error("configuration: {0}")]
    Configuration(String),

    /// An action name that is not installed
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// No table bound for an abstract role
    #[error("no binding registered for {0}")]
    Unbound(Role),

    /// The subject is not allowed to perform the action
    #[error("not allowed to {action} {resource}")]
    Denied { action: String, resource: String },

    /// Companion ACL records are missing or could not be written
    #[error("consistency: {0}")]
    Consistency(String),

    /// A stored record does not have the shape of its role
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Raised by the record store
    #[error("store: {0}")]
    Store(String),
}

impl AclError {
    pub(crate) fn denied(action: &str, resource: impl std::fmt::Display) -> Self {
        AclError::Denied { action: action.to_string(), resource: resource.to_string() }
    }

    /// True for the expected business outcome, false for faults
    pub fn is_denied(&self) -> bool {
        matches!(self, AclError::Denied { .. })
    }

    /// Configuration and consistency faults must never be swallowed
    pub fn is_fault(&self) -> bool {
        !self.is_denied()
    }
}

/// Result type alias for acltree operations
pub type Result<T> = std::result::Result<T, AclError>;

/// Convert any store-level error to AclError
pub fn err<E: std::error::Error>(e: E) -> AclError {
    AclError::Store(e.to_string())
}
