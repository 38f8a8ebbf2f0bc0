//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Parley operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Completion service errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Transport callback errors ---
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Action errors ---
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the completion service (transport or service side).
///
/// These terminate the current turn; the loop never retries them.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures of the transport capability callbacks (send, reply, confirm...).
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message delivery failed to {chat_id}: {reason}")]
    DeliveryFailed { chat_id: String, reason: String },

    #[error("Operation not supported by transport: {0}")]
    Unsupported(String),

    #[error("Transport connection lost: {0}")]
    ConnectionLost(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Failures raised by the action execution framework.
///
/// `NotFound` and `PermissionDenied` are denials: surfaced to the user and
/// never retried. `InvalidArguments` and `ExecutionFailed` are recoverable
/// tool errors that the model gets to see and correct.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Action not found: {0}")]
    NotFound(String),

    #[error("Permission denied for {action}: {reason}")]
    PermissionDenied { action: String, reason: String },

    #[error("Invalid action arguments: {0}")]
    InvalidArguments(String),

    #[error("Action {action} failed: {reason}")]
    ExecutionFailed { action: String, reason: String },

    #[error("Action {action} used capability '{capability}' without the permission flag")]
    MissingCapability { action: String, capability: String },
}

impl ActionError {
    /// Whether this error is a denial rather than a recoverable failure.
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::PermissionDenied { .. })
    }
}

impl From<StoreError> for ActionError {
    fn from(err: StoreError) -> Self {
        Self::ExecutionFailed {
            action: "storage".into(),
            reason: err.to_string(),
        }
    }
}

impl From<ProviderError> for ActionError {
    fn from(err: ProviderError) -> Self {
        Self::ExecutionFailed {
            action: "llm".into(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn action_error_displays_correctly() {
        let err = Error::Action(ActionError::PermissionDenied {
            action: "clear_history".into(),
            reason: "admin required".into(),
        });
        assert!(err.to_string().contains("clear_history"));
        assert!(err.to_string().contains("admin"));
    }

    #[test]
    fn denials_are_classified() {
        assert!(ActionError::NotFound("x".into()).is_denial());
        assert!(ActionError::PermissionDenied {
            action: "x".into(),
            reason: "y".into()
        }
        .is_denial());
        assert!(!ActionError::InvalidArguments("bad json".into()).is_denial());
        assert!(!ActionError::ExecutionFailed {
            action: "x".into(),
            reason: "boom".into()
        }
        .is_denial());
    }
}
