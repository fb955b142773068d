//! Retrieval and generation pipeline for DocQuery.
//!
//! Answers natural-language questions over a document collection:
//! similarity search through a MongoDB-style `$vectorSearch` pipeline,
//! optional metadata filters constructed by a generation model
//! ("self-querying"), and optional answer synthesis over the retrieved
//! context.
//!
//! # Example
//! ```no_run
//! use docquery_core::config::AppConfig;
//! use docquery_retrieval::{
//!     create_provider, create_store, ChainFactory, ChainKind, RequestProcessor,
//!     RetrievalRequest, VectorSearchStore,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let store = create_store(&config.store, &[]).await?;
//! let embeddings = create_provider(&config.embedding)?;
//! let llm = docquery_llm::create_client(&config.llm)?;
//!
//! let vector_store = VectorSearchStore::from_config(store, embeddings, &config.store);
//! let factory = ChainFactory::from_config(vector_store, llm, &config)?;
//! let processor = RequestProcessor::new(factory);
//!
//! let request = RetrievalRequest::new("movies about dinosaurs", ChainKind::Rag);
//! let response = processor.process(&request).await;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```

pub mod backfill;
pub mod chain;
pub mod document;
pub mod embeddings;
pub mod processor;
pub mod projection;
pub mod retriever;
pub mod self_query;
pub mod store;
pub mod vector_store;


// Re-export commonly used types
pub use backfill::{BackfillStats, EmbeddingBackfill};
pub use chain::{Chain, ChainContext, ChainFactory, ChainKind, ChainSettings, GenerationResult};
pub use document::{Document, ScoredDocument};
pub use embeddings::{create_provider, EmbeddingProvider};
pub use processor::{
    ErrorBody, ErrorKind, ProcessedResponse, RequestProcessor, RetrievalRequest, Severity,
};
pub use projection::Projection;
pub use retriever::{Retriever, SelfQueryRetriever, VectorSearchRetriever};
pub use self_query::{MetadataSchema, SelfQueryConstructor, StructuredQuery};
pub use store::{create_store, DocumentStore, InMemoryStore, MongoStore};
pub use vector_store::{SearchOptions, VectorSearchStore, MAX_K, OVERSCAN};
