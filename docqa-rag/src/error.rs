//! Error types for the `docqa-rag` crate.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur in retrieval, gating, prompt assembly, or generation.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error (bad chunk sizes, thresholds, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A write to the vector index failed. Nothing from the batch was committed.
    #[error("Index write error ({backend}): {message}")]
    IndexWrite {
        /// The index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A read from the vector index (query, count, listing) failed.
    #[error("Index read error ({backend}): {message}")]
    IndexRead {
        /// The index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The query could not be processed (blank text, `top_k == 0`).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The answer generator failed to produce a response.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },
}

/// Coarse classification of a [`RagError`], stable across error messages.
///
/// Callers presenting a friendly message should still carry the kind so that
/// upstream handlers can tell a bad request from an outage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid chunking or gating parameters.
    Configuration,
    /// Dimensionality mismatch or backend write failure.
    IndexWrite,
    /// Backend read failure.
    IndexRead,
    /// Empty question or invalid `top_k`.
    InvalidQuery,
    /// The embedding provider or answer generator failed.
    Collaborator,
}

impl ErrorKind {
    /// The snake_case name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::IndexWrite => "index_write",
            ErrorKind::IndexRead => "index_read",
            ErrorKind::InvalidQuery => "invalid_query",
            ErrorKind::Collaborator => "collaborator",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RagError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Config(_) => ErrorKind::Configuration,
            RagError::IndexWrite { .. } => ErrorKind::IndexWrite,
            RagError::IndexRead { .. } => ErrorKind::IndexRead,
            RagError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            RagError::Embedding { .. } | RagError::Generation { .. } => ErrorKind::Collaborator,
        }
    }

    /// A short message suitable for end users. The full cause stays in
    /// [`Display`](std::fmt::Display).
    pub fn user_message(&self) -> String {
        match self {
            RagError::Config(message) => format!("The service is misconfigured: {message}"),
            RagError::IndexWrite { .. } => {
                "The document could not be stored; no chunks were added.".to_string()
            }
            RagError::IndexRead { .. } => "The document index is currently unavailable.".to_string(),
            RagError::InvalidQuery(message) => message.clone(),
            RagError::Embedding { .. } => {
                "Sorry, the text could not be processed right now. Please try again.".to_string()
            }
            RagError::Generation { .. } => {
                "Sorry, I encountered an error while generating an answer.".to_string()
            }
        }
    }

    pub(crate) fn index_write(backend: &str, message: impl Into<String>) -> Self {
        RagError::IndexWrite { backend: backend.to_string(), message: message.into() }
    }

    pub(crate) fn index_read(backend: &str, message: impl Into<String>) -> Self {
        RagError::IndexRead { backend: backend.to_string(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_errors_share_a_kind() {
        let embed = RagError::Embedding { provider: "x".into(), message: "down".into() };
        let generate = RagError::Generation { provider: "y".into(), message: "timeout".into() };
        assert_eq!(embed.kind(), ErrorKind::Collaborator);
        assert_eq!(generate.kind(), ErrorKind::Collaborator);
    }

    #[test]
    fn user_message_hides_backend_detail_but_kind_survives() {
        let err = RagError::index_write("InMemory", "disk full at /var/lib");
        assert!(!err.user_message().contains("/var/lib"));
        assert!(err.to_string().contains("disk full"));
        assert_eq!(err.kind(), ErrorKind::IndexWrite);
        assert_eq!(serde_json::to_value(err.kind()).unwrap(), "index_write");
    }
}
