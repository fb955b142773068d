//! Request processing and error classification.
//!
//! [`RequestProcessor::process`] is the one place where pipeline errors are
//! caught. Each [`AppError`] variant is mapped to an [`ErrorKind`] with a
//! fixed message and severity; the internal error text is logged and never
//! returned to the caller.

use crate::chain::{ChainFactory, ChainKind, GenerationResult};
use crate::projection::Projection;
use crate::vector_store::check_k;
use docquery_core::AppError;
use serde::{Deserialize, Serialize};

/// Result count when the caller does not give one.
pub const DEFAULT_K: usize = 3;

/// One retrieval request as received from the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,

    #[serde(default = "default_k")]
    pub k: usize,

    /// Raw projection text, parsed and validated during processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<String>,

    pub kind: ChainKind,
}

fn default_k() -> usize {
    DEFAULT_K
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, kind: ChainKind) -> Self {
        Self {
            query: query.into(),
            k: DEFAULT_K,
            projection: None,
            kind,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = Some(projection.into());
        self
    }
}

/// Who is at fault for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    UserError,
    ServerError,
}

impl Severity {
    /// HTTP-style status code.
    pub fn status(&self) -> u16 {
        match self {
            Self::UserError => 400,
            Self::ServerError => 500,
        }
    }
}

/// Caller-facing failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    FilterParseError,
    FilterGrammarError,
    DatastoreOperationError,
    UnknownError,
    InvalidRequest,
}

impl ErrorKind {
    /// Map an internal error to its kind. First match wins.
    pub fn classify(error: &AppError) -> Self {
        match error {
            AppError::FilterParse(_) => Self::FilterParseError,
            AppError::FilterGrammar(_) => Self::FilterGrammarError,
            AppError::Datastore(_) => Self::DatastoreOperationError,
            AppError::InvalidRequest(_) => Self::InvalidRequest,
            _ => Self::UnknownError,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::FilterParseError | Self::FilterGrammarError | Self::InvalidRequest => {
                Severity::UserError
            }
            Self::DatastoreOperationError | Self::UnknownError => Severity::ServerError,
        }
    }

    /// Fixed caller-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::FilterParseError | Self::FilterGrammarError => {
                "There was a problem parsing filters from your query. Try rephrasing it."
            }
            Self::DatastoreOperationError => {
                "There was a problem running the query against the datastore."
            }
            Self::UnknownError => "An unknown error occurred while processing the request.",
            Self::InvalidRequest => {
                "The request was invalid. Check the projection and the result count."
            }
        }
    }
}

/// Error part of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
}

impl From<ErrorKind> for ErrorBody {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: kind.message().to_string(),
        }
    }
}

/// Outcome of one request. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedResponse {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ProcessedResponse {
    fn success(result: GenerationResult) -> Self {
        Self {
            status: 200,
            result: Some(result),
            error: None,
        }
    }

    fn failure(kind: ErrorKind) -> Self {
        Self {
            status: kind.severity().status(),
            result: None,
            error: Some(kind.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Runs requests through chains and classifies their failures.
#[derive(Clone)]
pub struct RequestProcessor {
    factory: ChainFactory,
}

impl RequestProcessor {
    pub fn new(factory: ChainFactory) -> Self {
        Self { factory }
    }

    /// Process one request. Never fails; errors become error responses.
    pub async fn process(&self, request: &RetrievalRequest) -> ProcessedResponse {
        match self.run(request).await {
            Ok(result) => ProcessedResponse::success(result),
            Err(error) => {
                let kind = ErrorKind::classify(&error);
                let chain = request.kind.as_str();
                match kind.severity() {
                    Severity::UserError => {
                        tracing::warn!(?kind, chain, "Request rejected: {}", error)
                    }
                    Severity::ServerError => {
                        tracing::error!(?kind, chain, "Request failed: {}", error)
                    }
                }
                ProcessedResponse::failure(kind)
            }
        }
    }

    async fn run(&self, request: &RetrievalRequest) -> Result<GenerationResult, AppError> {
        check_k(request.k)?;
        let projection = self.resolve_projection(request.projection.as_deref())?;

        let chain = self.factory.build(request.kind, request.k, Some(projection))?;
        chain.invoke(&request.query).await
    }

    /// Caller-supplied projection, or the default that hides the identifier
    /// and the embedding.
    ///
    /// The embedding stays hidden unless the caller's projection names it.
    pub fn resolve_projection(&self, raw: Option<&str>) -> Result<Projection, AppError> {
        let vector_store = self.factory.vector_store();
        match raw {
            Some(text) => Ok(Projection::parse(text)?.hiding(vector_store.embedding_key())),
            None => Ok(vector_store.default_projection()),
        }
    }
}
