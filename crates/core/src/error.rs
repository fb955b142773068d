//! Error types for DocQuery.
//!
//! Every pipeline stage reports failures through one variant of [`AppError`],
//! named after the stage that produced it. Classification into the
//! user-facing taxonomy happens once, in the request processor of the
//! retrieval crate; nothing below it interprets these variants.

use thiserror::Error;

/// Unified error type for DocQuery.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generation model errors (transport, HTTP status, response decoding)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The document store rejected or failed a query
    #[error("Datastore error: {0}")]
    Datastore(String),

    /// Model output for a structured query was not well-formed structured content
    #[error("Filter parse error: {0}")]
    FilterParse(String),

    /// Filter expression did not fit the predicate grammar or the metadata schema
    #[error("Filter grammar error: {0}")]
    FilterGrammar(String),

    /// Caller-supplied request parameters were rejected at the boundary
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Prompt rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_stage() {
        let err = AppError::Datastore("index not found".to_string());
        assert_eq!(err.to_string(), "Datastore error: index not found");

        let err = AppError::FilterGrammar("unexpected ')'".to_string());
        assert!(err.to_string().starts_with("Filter grammar error"));
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: AppError = parse_err.into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
