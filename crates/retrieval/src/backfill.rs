//! Embedding backfill for documents that do not have one yet.

use crate::embeddings::EmbeddingProvider;
use crate::store::DocumentStore;
use docquery_core::AppResult;
use mongodb::bson::{Bson, Document as BsonDocument};
use serde::Serialize;
use std::sync::Arc;

/// Field carrying an embedding computed by an older pipeline.
pub const LEGACY_VECTOR_FIELD: &str = "vector";

/// Counts from one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    pub embedded: usize,
    /// Documents without a title
    pub skipped: usize,
    /// Documents that already carry a legacy vector
    pub already_computed: usize,
}

/// Computes embeddings for every document missing the embedding field.
///
/// Only documents without the field are selected, so an existing embedding
/// is never recomputed and running the backfill twice is a no-op the second
/// time.
pub struct EmbeddingBackfill {
    store: Arc<dyn DocumentStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    embedding_key: String,
}

impl EmbeddingBackfill {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        embedding_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embeddings,
            embedding_key: embedding_key.into(),
        }
    }

    pub async fn run(&self) -> AppResult<BackfillStats> {
        let pending = self.store.find_missing(&self.embedding_key).await?;
        tracing::info!(
            "Backfilling '{}' for {} documents with {}/{}",
            self.embedding_key,
            pending.len(),
            self.embeddings.provider_name(),
            self.embeddings.model_name()
        );

        let mut stats = BackfillStats::default();
        for document in pending {
            let id = document.get("_id").cloned().unwrap_or(Bson::Null);

            if document.contains_key(LEGACY_VECTOR_FIELD) {
                tracing::debug!("Vector already computed for document {}", id);
                stats.already_computed += 1;
                continue;
            }

            let Some(text) = embedding_text(&document) else {
                tracing::debug!("Document {} has no title, skipping", id);
                stats.skipped += 1;
                continue;
            };

            let vector = self.embeddings.embed(&text).await?;
            let vector: Vec<Bson> = vector
                .into_iter()
                .map(|v| Bson::Double(f64::from(v)))
                .collect();
            let mut update = BsonDocument::new();
            update.insert(self.embedding_key.clone(), vector);
            self.store.set_fields(&id, update).await?;
            stats.embedded += 1;
        }

        tracing::info!(
            embedded = stats.embedded,
            skipped = stats.skipped,
            already_computed = stats.already_computed,
            "Backfill finished"
        );
        Ok(stats)
    }
}

/// Text embedded for a document: its title line, then the full plot if any.
pub fn embedding_text(document: &BsonDocument) -> Option<String> {
    let title = match document.get("title")? {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut text = format!("Title: \"{}\"\n", title);
    if let Some(Bson::String(plot)) = document.get("fullplot") {
        if !plot.is_empty() {
            text.push_str("Fullplot: ");
            text.push_str(plot);
        }
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;
    use crate::store::{InMemoryStore, VectorIndexDefinition};
    use mongodb::bson::doc;
    use serde_json::json;

    #[test]
    fn test_embedding_text() {
        let full = doc! { "title": "Jurassic Park", "fullplot": "Dinosaurs escape." };
        assert_eq!(
            embedding_text(&full).unwrap(),
            "Title: \"Jurassic Park\"\nFullplot: Dinosaurs escape."
        );
        assert_eq!(
            embedding_text(&doc! { "title": "Alien", "fullplot": "" }).unwrap(),
            "Title: \"Alien\"\n"
        );
        assert!(embedding_text(&doc! { "fullplot": "no title" }).is_none());
    }

    #[tokio::test]
    async fn test_run_counts_and_writes() {
        let store = Arc::new(InMemoryStore::new(VectorIndexDefinition::new(
            "vector_index",
            "embedding",
            vec![],
        )));
        store
            .insert_many([
                json!({"_id": "a", "title": "Jurassic Park", "fullplot": "Dinosaurs escape."}),
                json!({"_id": "b", "fullplot": "Untitled"}),
                json!({"_id": "c", "title": "Old", "vector": [0.1, 0.2]}),
                json!({"_id": "d", "title": "Done", "embedding": [1.0, 0.0]}),
            ])
            .await
            .unwrap();

        let embedder = Arc::new(MockEmbeddingProvider::new(8));
        let backfill = EmbeddingBackfill::new(store.clone(), embedder.clone(), "embedding");

        let stats = backfill.run().await.unwrap();
        assert_eq!(
            stats,
            BackfillStats {
                embedded: 1,
                skipped: 1,
                already_computed: 1,
            }
        );

        let a = store.get(&json!("a")).await.unwrap();
        let expected = embedder.vector_for("Title: \"Jurassic Park\"\nFullplot: Dinosaurs escape.");
        let stored: Vec<f32> = serde_json::from_value(a["embedding"].clone()).unwrap();
        assert_eq!(stored, expected);

        let d = store.get(&json!("d")).await.unwrap();
        assert_eq!(d["embedding"], json!([1.0, 0.0]));
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let store = Arc::new(InMemoryStore::new(VectorIndexDefinition::new(
            "vector_index",
            "embedding",
            vec![],
        )));
        store
            .insert(json!({"_id": "a", "title": "Heat"}))
            .await
            .unwrap();
        let backfill = EmbeddingBackfill::new(
            store.clone(),
            Arc::new(MockEmbeddingProvider::new(8)),
            "embedding",
        );

        backfill.run().await.unwrap();
        let first = store.get(&json!("a")).await.unwrap();

        let stats = backfill.run().await.unwrap();
        assert_eq!(stats, BackfillStats::default());
        assert_eq!(store.get(&json!("a")).await.unwrap(), first);
    }
}
