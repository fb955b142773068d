//! Similarity search over the document store.
//!
//! Builds the `$vectorSearch` aggregation pipeline and materializes the
//! results into scored documents. Stage order is fixed:
//!
//! 1. `$vectorSearch` with `numCandidates = k * OVERSCAN` and `limit = k`
//! 2. `$set` of the score from the search metadata
//! 3. the projection, if any
//! 4. caller-supplied post-filter stages, if any

use crate::document::{Document, ScoredDocument, SCORE_FIELD};
use crate::embeddings::EmbeddingProvider;
use crate::projection::Projection;
use crate::store::DocumentStore;
use docquery_core::config::StoreConfig;
use docquery_core::{AppError, AppResult};
use mongodb::bson::{doc, Bson, Document as BsonDocument};
use serde_json::Value;
use std::sync::Arc;

/// Candidates considered per requested result.
pub const OVERSCAN: usize = 10;

/// Upper bound Atlas accepts for `numCandidates`.
pub const MAX_NUM_CANDIDATES: usize = 10_000;

/// Largest `k` whose overscan stays within `MAX_NUM_CANDIDATES`.
pub const MAX_K: usize = MAX_NUM_CANDIDATES / OVERSCAN;

/// Reject a result count the search cannot serve.
pub fn check_k(k: usize) -> AppResult<()> {
    if k == 0 {
        return Err(AppError::InvalidRequest("k must be positive".to_string()));
    }
    if k > MAX_K {
        return Err(AppError::InvalidRequest(format!(
            "k must be at most {}, got {}",
            MAX_K, k
        )));
    }
    Ok(())
}

/// Optional pipeline parts for one search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Filter evaluated inside the vector search, before ranking
    pub pre_filter: Option<BsonDocument>,

    /// Stages appended after the projection
    pub post_filter_pipeline: Vec<BsonDocument>,

    /// Projection stage placed after the score annotation
    pub projection: Option<Projection>,
}

impl SearchOptions {
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_pre_filter(mut self, filter: BsonDocument) -> Self {
        self.pre_filter = Some(filter);
        self
    }

    pub fn with_post_filter(mut self, stage: BsonDocument) -> Self {
        self.post_filter_pipeline.push(stage);
        self
    }
}

/// Vector search over one collection and index.
#[derive(Clone)]
pub struct VectorSearchStore {
    store: Arc<dyn DocumentStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    index_name: String,
    embedding_key: String,
}

impl VectorSearchStore {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        index_name: impl Into<String>,
        embedding_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embeddings,
            index_name: index_name.into(),
            embedding_key: embedding_key.into(),
        }
    }

    /// Use the index and embedding field named in the store settings.
    pub fn from_config(
        store: Arc<dyn DocumentStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        config: &StoreConfig,
    ) -> Self {
        Self::new(store, embeddings, &config.index_name, &config.embedding_key)
    }

    /// Field the embeddings are stored in.
    pub fn embedding_key(&self) -> &str {
        &self.embedding_key
    }

    /// Projection applied when the caller does not supply one.
    pub fn default_projection(&self) -> Projection {
        Projection::default_for(&self.embedding_key)
    }

    /// Assemble the aggregation pipeline for a query vector.
    ///
    /// # Errors
    /// `AppError::InvalidRequest` if `k` is zero or above `MAX_K`.
    pub fn build_pipeline(
        &self,
        query_vector: &[f32],
        k: usize,
        options: &SearchOptions,
    ) -> AppResult<Vec<BsonDocument>> {
        check_k(k)?;
        let vector: Vec<Bson> = query_vector
            .iter()
            .map(|v| Bson::Double(f64::from(*v)))
            .collect();

        let mut params = doc! {
            "index": self.index_name.as_str(),
            "path": self.embedding_key.as_str(),
            "queryVector": vector,
            "numCandidates": (k * OVERSCAN) as i64,
            "limit": k as i64,
        };
        if let Some(filter) = &options.pre_filter {
            params.insert("filter", filter.clone());
        }

        let mut pipeline = vec![
            doc! { "$vectorSearch": params },
            doc! { "$set": { "score": { "$meta": "vectorSearchScore" } } },
        ];
        if let Some(projection) = &options.projection {
            pipeline.push(projection.to_stage());
        }
        pipeline.extend(options.post_filter_pipeline.iter().cloned());
        Ok(pipeline)
    }

    /// Search with an already-embedded query.
    ///
    /// # Errors
    /// `AppError::InvalidRequest` if `k` is zero or above `MAX_K`, `AppError::Datastore` if
    /// the store rejects the pipeline or returns a result without a score.
    pub async fn similarity_search_with_score(
        &self,
        query_vector: &[f32],
        k: usize,
        options: &SearchOptions,
    ) -> AppResult<Vec<ScoredDocument>> {
        let pipeline = self.build_pipeline(query_vector, k, options)?;
        tracing::debug!(
            stages = pipeline.len(),
            pre_filter = options.pre_filter.is_some(),
            "Running vector search on {}",
            self.store.backend_name()
        );

        let raw = self.store.aggregate(pipeline).await?;

        let mut results = raw
            .into_iter()
            .map(materialize)
            .collect::<AppResult<Vec<_>>>()?;

        if results.len() > k {
            tracing::debug!("Post-filter stages produced {} results, keeping {}", results.len(), k);
            results.truncate(k);
        }

        tracing::info!("Vector search returned {} documents", results.len());
        Ok(results)
    }

    /// Embed `query` and search.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        options: &SearchOptions,
    ) -> AppResult<Vec<ScoredDocument>> {
        let vector = self.embeddings.embed(query).await?;
        self.similarity_search_with_score(&vector, k, options).await
    }

    /// Embed `query` and search, dropping scores.
    ///
    /// With `annotate_score` the score is written into each document's
    /// `score` field instead.
    pub async fn similarity_search_documents(
        &self,
        query: &str,
        k: usize,
        options: &SearchOptions,
        annotate_score: bool,
    ) -> AppResult<Vec<Document>> {
        let scored = self.similarity_search(query, k, options).await?;
        Ok(scored
            .into_iter()
            .map(|ScoredDocument { mut document, score }| {
                if annotate_score {
                    document
                        .fields
                        .insert(SCORE_FIELD.to_string(), Value::from(f64::from(score)));
                }
                document
            })
            .collect())
    }
}

/// Pop the score, split off the identifier, keep the rest as content.
fn materialize(raw: BsonDocument) -> AppResult<ScoredDocument> {
    let Value::Object(mut object) = Bson::Document(raw).into_relaxed_extjson() else {
        return Err(AppError::Datastore(
            "Search result is not a document".to_string(),
        ));
    };

    let score = object
        .shift_remove(SCORE_FIELD)
        .as_ref()
        .and_then(Value::as_f64)
        .ok_or_else(|| AppError::Datastore("Search result has no score".to_string()))?;

    Ok(ScoredDocument {
        document: Document::from_object(object),
        score: score as f32,
    })
}
