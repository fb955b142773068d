//! Document store abstraction.
//!
//! The store speaks the MongoDB aggregation language: the vector search
//! store hands it a pipeline of BSON stages and gets raw result documents
//! back. Two backends implement it, a MongoDB Atlas collection and an
//! in-process collection that interprets the same stages.

pub mod memory;
pub mod mongo;
mod mql;

pub use memory::{InMemoryStore, VectorIndexDefinition};
pub use mongo::MongoStore;

use docquery_core::config::StoreConfig;
use docquery_core::{AppError, AppResult};
use mongodb::bson::{Bson, Document as BsonDocument};
use std::sync::Arc;

/// A collection of documents queried through aggregation pipelines.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name for logs (e.g., "mongodb", "memory").
    fn backend_name(&self) -> &str;

    /// Run an aggregation pipeline and collect every result.
    ///
    /// # Errors
    /// Any rejection or failure is reported as `AppError::Datastore`.
    async fn aggregate(&self, pipeline: Vec<BsonDocument>) -> AppResult<Vec<BsonDocument>>;

    /// Documents that do not have `field` at all.
    async fn find_missing(&self, field: &str) -> AppResult<Vec<BsonDocument>>;

    /// `$set` the given fields on the document with identifier `id`.
    async fn set_fields(&self, id: &Bson, fields: BsonDocument) -> AppResult<()>;
}

/// Build the configured store backend.
///
/// `filter_fields` are the paths the vector index allows in a pre-filter;
/// only the in-memory backend needs them, Atlas keeps its own index
/// definition.
pub async fn create_store(
    config: &StoreConfig,
    filter_fields: &[String],
) -> AppResult<Arc<dyn DocumentStore>> {
    match config.backend.as_str() {
        "mongodb" => {
            let (uri, database, collection) =
                match (&config.uri, &config.database, &config.collection) {
                    (Some(uri), Some(db), Some(coll)) => (uri, db, coll),
                    _ => {
                        return Err(AppError::Config(
                            "MongoDB store requires uri, database and collection".to_string(),
                        ))
                    }
                };
            let store = MongoStore::connect(uri, database, collection).await?;
            Ok(Arc::new(store))
        }

        "memory" => {
            let index = VectorIndexDefinition::new(
                &config.index_name,
                &config.embedding_key,
                filter_fields.to_vec(),
            );
            let store = match &config.seed_file {
                Some(path) => InMemoryStore::from_seed_file(path, index).await?,
                None => {
                    tracing::warn!("In-memory store has no seed file; collection is empty");
                    InMemoryStore::new(index)
                }
            };
            Ok(Arc::new(store))
        }

        other => Err(AppError::Config(format!(
            "Unknown store backend: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_create_memory_store_from_seed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"_id": "m1", "title": "Alien"}}]"#).unwrap();

        let config = StoreConfig {
            backend: "memory".to_string(),
            seed_file: Some(file.path().to_path_buf()),
            ..StoreConfig::default()
        };
        let store = create_store(&config, &[]).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert_eq!(store.find_missing("embedding").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mongodb_requires_connection_settings() {
        let result = create_store(&StoreConfig::default(), &[]).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let config = StoreConfig {
            backend: "sqlite".to_string(),
            ..StoreConfig::default()
        };
        assert!(create_store(&config, &[]).await.is_err());
    }
}
