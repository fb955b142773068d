//! Search and ask command handlers.

use super::Components;
use clap::Args;
use docquery_core::{config::AppConfig, AppResult};
use docquery_retrieval::{ChainKind, RetrievalRequest};

/// Retrieve documents or an answer for a question
#[derive(Args, Debug)]
pub struct QueryCommand {
    /// The question or search text
    pub query: String,

    /// Number of documents to retrieve (default: from config)
    #[arg(short, long)]
    pub k: Option<usize>,

    /// Projection as a JSON object, e.g. '{"title": 1, "_id": 0}'
    #[arg(long)]
    pub projection: Option<String>,

    /// Let the model construct a metadata filter from the query
    #[arg(long)]
    pub self_query: bool,
}

impl QueryCommand {
    /// Run the query and print the response as JSON.
    ///
    /// Returns whether the request succeeded.
    pub async fn execute(&self, config: &AppConfig, synthesize: bool) -> AppResult<bool> {
        let kind = ChainKind::from_parts(self.self_query, synthesize);
        tracing::info!("Executing {} request", kind.as_str());

        let components = Components::connect(config).await?;
        let processor = components.processor(config)?;

        let mut request = RetrievalRequest::new(&self.query, kind)
            .with_k(self.k.unwrap_or(config.retrieval.default_k));
        if let Some(projection) = &self.projection {
            request = request.with_projection(projection);
        }

        let response = processor.process(&request).await;
        println!("{}", serde_json::to_string_pretty(&response)?);

        Ok(response.is_success())
    }
}
