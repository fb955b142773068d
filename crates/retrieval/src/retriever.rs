//! Retrievers: the retrieval stage of a chain.

use crate::document::ScoredDocument;
use crate::projection::Projection;
use crate::self_query::{to_mongo_filter, SelfQueryConstructor};
use crate::vector_store::{SearchOptions, VectorSearchStore};
use docquery_core::AppResult;

/// Turns a query into ranked documents.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> AppResult<Vec<ScoredDocument>>;
}

/// Plain similarity search with a fixed projection.
#[derive(Clone)]
pub struct VectorSearchRetriever {
    store: VectorSearchStore,
    k: usize,
    projection: Option<Projection>,
}

impl VectorSearchRetriever {
    pub fn new(store: VectorSearchStore, k: usize, projection: Option<Projection>) -> Self {
        Self {
            store,
            k,
            projection,
        }
    }
}

#[async_trait::async_trait]
impl Retriever for VectorSearchRetriever {
    async fn retrieve(&self, query: &str) -> AppResult<Vec<ScoredDocument>> {
        let options = SearchOptions {
            projection: self.projection.clone(),
            ..SearchOptions::default()
        };
        self.store.similarity_search(query, self.k, &options).await
    }
}

/// Similarity search restricted by a model-constructed metadata filter.
///
/// The constructed query text replaces the user's text for embedding when
/// it is nonempty. A model-proposed limit can lower `k` but never raise it.
#[derive(Clone)]
pub struct SelfQueryRetriever {
    store: VectorSearchStore,
    constructor: SelfQueryConstructor,
    k: usize,
    projection: Option<Projection>,
}

impl SelfQueryRetriever {
    pub fn new(
        store: VectorSearchStore,
        constructor: SelfQueryConstructor,
        k: usize,
        projection: Option<Projection>,
    ) -> Self {
        Self {
            store,
            constructor,
            k,
            projection,
        }
    }
}

#[async_trait::async_trait]
impl Retriever for SelfQueryRetriever {
    async fn retrieve(&self, query: &str) -> AppResult<Vec<ScoredDocument>> {
        let structured = self.constructor.construct(query).await?;

        let search_text = if structured.query.is_empty() {
            query
        } else {
            structured.query.as_str()
        };
        let k = structured.limit.map_or(self.k, |limit| limit.min(self.k));

        let mut options = SearchOptions {
            projection: self.projection.clone(),
            ..SearchOptions::default()
        };
        if let Some(filter) = &structured.filter {
            options = options.with_pre_filter(to_mongo_filter(filter));
        }

        tracing::debug!(
            search_text,
            k,
            filtered = options.pre_filter.is_some(),
            "Self-query search"
        );
        self.store.similarity_search(search_text, k, &options).await
    }
}
