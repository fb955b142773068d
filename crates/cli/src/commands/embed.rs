//! Embed command handler.

use super::Components;
use clap::Args;
use docquery_core::{config::AppConfig, AppResult};
use docquery_retrieval::EmbeddingBackfill;

/// Compute embeddings for documents that do not have one
#[derive(Args, Debug)]
pub struct EmbedCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl EmbedCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing embed command");

        let components = Components::connect(config).await?;
        let backfill = EmbeddingBackfill::new(
            components.store,
            components.embeddings,
            &config.store.embedding_key,
        );
        let stats = backfill.run().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Embedded:         {}", stats.embedded);
            println!("Skipped:          {}", stats.skipped);
            println!("Already computed: {}", stats.already_computed);
        }
        Ok(())
    }
}
