//! Command handlers for the DocQuery CLI.

pub mod embed;
pub mod query;

pub use embed::EmbedCommand;
pub use query::QueryCommand;

use docquery_core::{config::AppConfig, AppResult};
use docquery_retrieval::{
    create_provider, create_store, ChainFactory, DocumentStore, EmbeddingProvider,
    RequestProcessor, VectorSearchStore,
};
use std::sync::Arc;

/// Process-wide handles, built once and shared by every request.
pub struct Components {
    pub store: Arc<dyn DocumentStore>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
}

impl Components {
    pub async fn connect(config: &AppConfig) -> AppResult<Self> {
        // The in-memory index accepts pre-filters on the schema attributes
        let filter_fields: Vec<String> = config
            .retrieval
            .metadata_schema
            .iter()
            .map(|a| a.name.clone())
            .collect();

        let store = create_store(&config.store, &filter_fields).await?;
        let embeddings = create_provider(&config.embedding)?;
        tracing::debug!(
            "Components ready: store={}, embeddings={}/{}",
            store.backend_name(),
            embeddings.provider_name(),
            embeddings.model_name()
        );
        Ok(Self { store, embeddings })
    }

    /// Wire the request processor with every chain variant.
    pub fn processor(&self, config: &AppConfig) -> AppResult<RequestProcessor> {
        let llm = docquery_llm::create_client(&config.llm)?;
        let vector_store = VectorSearchStore::from_config(
            self.store.clone(),
            self.embeddings.clone(),
            &config.store,
        );
        let factory = ChainFactory::from_config(vector_store, llm, config)?;
        Ok(RequestProcessor::new(factory))
    }
}
