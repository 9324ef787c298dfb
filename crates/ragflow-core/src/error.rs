//! Error types for ragflow

use thiserror::Error;

/// Result type alias using RagFlowError
pub type Result<T> = std::result::Result<T, RagFlowError>;

/// Error type alias for convenience
pub type Error = RagFlowError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Completion failure reasons the caller may branch on.
///
/// Rate limits are worth retrying with backoff; auth failures are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    /// HTTP 429 from the completion service
    RateLimited,
    /// The service rejected or truncated the response via content filtering
    ContentFiltered,
    /// Credential rejected (HTTP 401/403)
    Auth,
    /// Any other upstream failure
    Upstream,
}

impl std::fmt::Display for CompletionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RateLimited => "rate limited",
            Self::ContentFiltered => "content filtered",
            Self::Auth => "auth",
            Self::Upstream => "upstream",
        };
        f.write_str(s)
    }
}

/// Main error type for ragflow
#[derive(Debug, Error)]
pub enum RagFlowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Completion error ({kind}): {message}")]
    Completion {
        kind: CompletionErrorKind,
        message: String,
    },

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Deployment error: {0}")]
    Deployment(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RagFlowError {
    /// Build a completion error with a specific failure kind
    pub fn completion(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self::Completion {
            kind,
            message: message.into(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_codes::CONFIG_ERROR,
            Self::Evaluation(_) | Self::Template(_) => exit_codes::INVALID_INPUT,
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_use_config_exit_code() {
        let err = RagFlowError::Config("missing vars".into());
        assert_eq!(err.exit_code(), exit_codes::CONFIG_ERROR);
    }

    #[test]
    fn completion_error_displays_kind() {
        let err = RagFlowError::completion(CompletionErrorKind::RateLimited, "HTTP 429");
        assert_eq!(err.to_string(), "Completion error (rate limited): HTTP 429");
    }
}
