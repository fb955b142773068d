//! Embedding providers.
//!
//! Turns query text (and, for the backfill job, document text) into the
//! fixed-length vectors stored in the document store's embedding field.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{MockEmbeddingProvider, OllamaEmbeddingProvider};
