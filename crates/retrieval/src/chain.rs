//! Chain composition.
//!
//! A [`Chain`] is an ordered list of typed stages:
//!
//! ```text
//! retrieve: &str          -> ChainContext
//! render:   ChainContext  -> String        (answer variants only)
//! generate: String        -> String        (answer variants only)
//! parse:    String        -> String        (answer variants only)
//! ```
//!
//! Each stage returns an `AppResult`, so a failure is reported by the stage
//! that caused it and carries that stage's error variant.

use crate::document::{Document, ScoredDocument};
use crate::projection::Projection;
use crate::retriever::{Retriever, SelfQueryRetriever, VectorSearchRetriever};
use crate::self_query::SelfQueryConstructor;
use crate::vector_store::VectorSearchStore;
use docquery_core::config::AppConfig;
use docquery_core::{AppError, AppResult};
use docquery_llm::{LlmClient, LlmRequest};
use docquery_prompt::{answer_template, build_prompt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The four request types: retrieval mode crossed with output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    /// Similarity search, documents returned
    VectorSearch,
    /// Similarity search, answer synthesized
    Rag,
    /// Self-query search, documents returned
    SelfQueryVectorSearch,
    /// Self-query search, answer synthesized
    SelfQueryRag,
}

impl ChainKind {
    pub const ALL: [ChainKind; 4] = [
        Self::VectorSearch,
        Self::Rag,
        Self::SelfQueryVectorSearch,
        Self::SelfQueryRag,
    ];

    /// Assemble a kind from its two axes.
    pub fn from_parts(self_query: bool, synthesize: bool) -> Self {
        match (self_query, synthesize) {
            (false, false) => Self::VectorSearch,
            (false, true) => Self::Rag,
            (true, false) => Self::SelfQueryVectorSearch,
            (true, true) => Self::SelfQueryRag,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VectorSearch => "vector_search",
            Self::Rag => "rag",
            Self::SelfQueryVectorSearch => "self_query_vector_search",
            Self::SelfQueryRag => "self_query_rag",
        }
    }

    pub fn is_self_query(&self) -> bool {
        matches!(self, Self::SelfQueryVectorSearch | Self::SelfQueryRag)
    }

    pub fn synthesizes_answer(&self) -> bool {
        matches!(self, Self::Rag | Self::SelfQueryRag)
    }
}

/// Retrieved context plus the question it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainContext {
    pub context: Vec<Document>,
    pub question: String,
}

/// What a chain produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationResult {
    /// Retrieved documents, identifiers stripped, best match first
    Documents(Vec<Value>),
    /// Synthesized answer text
    Answer(String),
}

/// Final text-extraction stage. The models already return text, so this
/// only trims surrounding whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrOutputParser;

impl StrOutputParser {
    pub fn parse(&self, text: String) -> AppResult<String> {
        Ok(text.trim().to_string())
    }
}

/// Model settings for the generation stage.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub model: String,
    pub temperature: Option<f32>,
}

impl ChainSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
        }
    }
}

struct Generator {
    llm: Arc<dyn LlmClient>,
    settings: ChainSettings,
    parser: StrOutputParser,
}

/// A composed chain with a single entry point, [`Chain::invoke`].
pub struct Chain {
    kind: ChainKind,
    retriever: Box<dyn Retriever>,
    generator: Option<Generator>,
}

impl Chain {
    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    /// Retrieval stage.
    pub async fn retrieve(&self, query: &str) -> AppResult<ChainContext> {
        let scored = self.retriever.retrieve(query).await?;
        Ok(ChainContext {
            context: scored
                .into_iter()
                .map(|ScoredDocument { document, .. }| document)
                .collect(),
            question: query.to_string(),
        })
    }

    /// Prompt-render stage.
    pub fn render(&self, context: &ChainContext) -> AppResult<String> {
        let rendered_context = context
            .context
            .iter()
            .map(Document::content_text)
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut variables = HashMap::new();
        variables.insert("context".to_string(), rendered_context);
        variables.insert("question".to_string(), context.question.clone());
        Ok(build_prompt(&answer_template(), variables)?.user)
    }

    /// Generation stage.
    async fn generate(&self, generator: &Generator, prompt: String) -> AppResult<String> {
        let mut request = LlmRequest::new(prompt, &generator.settings.model);
        if let Some(temperature) = generator.settings.temperature {
            request = request.with_temperature(temperature);
        }
        let response = generator.llm.complete(&request).await?;
        tracing::debug!(
            completion_tokens = response.usage.completion_tokens,
            "Generation finished"
        );
        Ok(response.content)
    }

    /// Run every stage in order.
    pub async fn invoke(&self, query: &str) -> AppResult<GenerationResult> {
        tracing::info!(kind = self.kind.as_str(), "Invoking chain");
        let context = self.retrieve(query).await?;
        tracing::info!("Retrieved {} documents", context.context.len());

        match &self.generator {
            None => Ok(GenerationResult::Documents(
                context
                    .context
                    .into_iter()
                    .map(Document::into_content)
                    .collect(),
            )),
            Some(generator) => {
                let prompt = self.render(&context)?;
                tracing::debug!("Answer prompt:\n{}", prompt);
                let raw = self.generate(generator, prompt).await?;
                let answer = generator.parser.parse(raw)?;
                Ok(GenerationResult::Answer(answer))
            }
        }
    }
}

/// Builds chains from the process-wide handles.
#[derive(Clone)]
pub struct ChainFactory {
    vector_store: VectorSearchStore,
    llm: Arc<dyn LlmClient>,
    settings: ChainSettings,
    constructor: Option<SelfQueryConstructor>,
}

impl ChainFactory {
    /// Create a factory without self-query support.
    pub fn new(
        vector_store: VectorSearchStore,
        llm: Arc<dyn LlmClient>,
        settings: ChainSettings,
    ) -> Self {
        Self {
            vector_store,
            llm,
            settings,
            constructor: None,
        }
    }

    /// Enable the self-query variants.
    pub fn with_self_query(mut self, constructor: SelfQueryConstructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    /// Create a factory with every variant enabled from the configuration.
    pub fn from_config(
        vector_store: VectorSearchStore,
        llm: Arc<dyn LlmClient>,
        config: &AppConfig,
    ) -> AppResult<Self> {
        let constructor =
            SelfQueryConstructor::from_config(llm.clone(), &config.llm, &config.retrieval)?;
        let settings = ChainSettings {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
        };
        Ok(Self::new(vector_store, llm, settings).with_self_query(constructor))
    }

    pub fn vector_store(&self) -> &VectorSearchStore {
        &self.vector_store
    }

    /// Build a chain of `kind` returning at most `k` documents.
    pub fn build(
        &self,
        kind: ChainKind,
        k: usize,
        projection: Option<Projection>,
    ) -> AppResult<Chain> {
        let retriever: Box<dyn Retriever> = if kind.is_self_query() {
            let constructor = self.constructor.clone().ok_or_else(|| {
                AppError::Config("Self-query chains need a query constructor".to_string())
            })?;
            Box::new(SelfQueryRetriever::new(
                self.vector_store.clone(),
                constructor,
                k,
                projection,
            ))
        } else {
            Box::new(VectorSearchRetriever::new(
                self.vector_store.clone(),
                k,
                projection,
            ))
        };

        let generator = kind.synthesizes_answer().then(|| Generator {
            llm: self.llm.clone(),
            settings: self.settings.clone(),
            parser: StrOutputParser,
        });

        Ok(Chain {
            kind,
            retriever,
            generator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbeddingProvider, MockEmbeddingProvider};
    use crate::store::{InMemoryStore, VectorIndexDefinition};
    use docquery_llm::MockLlmClient;
    use serde_json::json;

    async fn factory(mock: Arc<MockLlmClient>) -> ChainFactory {
        let embedder = MockEmbeddingProvider::new(384);
        let store = Arc::new(InMemoryStore::new(VectorIndexDefinition::new(
            "vector_index",
            "embedding",
            vec!["year".to_string()],
        )));
        for (title, year) in [("haunted lighthouse keeper", 1980), ("lighthouse storm rescue", 2001)] {
            store
                .insert(json!({
                    "title": title,
                    "year": year,
                    "embedding": embedder.embed(title).await.unwrap(),
                }))
                .await
                .unwrap();
        }
        let vector_store =
            VectorSearchStore::new(store, Arc::new(embedder), "vector_index", "embedding");
        ChainFactory::new(vector_store, mock, ChainSettings::new("test-model"))
    }

    #[test]
    fn test_kind_axes() {
        for kind in ChainKind::ALL {
            assert_eq!(ChainKind::parse(kind.as_str()), Some(kind));
            assert_eq!(
                ChainKind::from_parts(kind.is_self_query(), kind.synthesizes_answer()),
                kind
            );
        }
        assert_eq!(ChainKind::parse("hybrid"), None);
    }

    #[test]
    fn test_output_parser_trims() {
        assert_eq!(
            StrOutputParser.parse("  answer\n".to_string()).unwrap(),
            "answer"
        );
    }

    #[tokio::test]
    async fn test_vector_search_chain_returns_documents() {
        let mock = Arc::new(MockLlmClient::new());
        let factory = factory(mock.clone()).await;
        let projection = factory.vector_store().default_projection();
        let chain = factory
            .build(ChainKind::VectorSearch, 1, Some(projection))
            .unwrap();

        match chain.invoke("lighthouse storm").await.unwrap() {
            GenerationResult::Documents(docs) => {
                assert_eq!(docs, vec![json!({"title": "lighthouse storm rescue", "year": 2001})]);
            }
            other => panic!("Expected documents, got {:?}", other),
        }
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_rag_chain_renders_context_and_question() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_text("  A keeper haunts the lighthouse.  ");
        let factory = factory(mock.clone()).await;
        let projection = factory.vector_store().default_projection();
        let chain = factory.build(ChainKind::Rag, 2, Some(projection)).unwrap();

        let result = chain.invoke("Who haunts the lighthouse?").await.unwrap();
        assert_eq!(
            result,
            GenerationResult::Answer("A keeper haunts the lighthouse.".to_string())
        );

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].is_structured());
        assert_eq!(requests[0].model, "test-model");
        let prompt = &requests[0].prompt;
        assert!(prompt.starts_with("Answer the question based only on the following context:\n"));
        assert!(prompt.contains("\"title\":\"haunted lighthouse keeper\""));
        assert!(prompt.ends_with("Question: Who haunts the lighthouse?\n"));
        assert!(!prompt.contains("embedding"));
    }

    #[tokio::test]
    async fn test_self_query_requires_constructor() {
        let factory = factory(Arc::new(MockLlmClient::new())).await;
        assert!(matches!(
            factory.build(ChainKind::SelfQueryRag, 3, None),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_failure("connection refused");
        let factory = factory(mock).await;
        let chain = factory.build(ChainKind::Rag, 1, None).unwrap();
        assert!(matches!(
            chain.invoke("lighthouse").await,
            Err(AppError::Llm(_))
        ));
    }

    #[test]
    fn test_result_serialization() {
        let value = serde_json::to_value(GenerationResult::Answer("yes".to_string())).unwrap();
        assert_eq!(value, json!({"answer": "yes"}));
    }
}
