//! Generation model integration for DocQuery.
//!
//! This crate provides a provider-agnostic abstraction over text-generation
//! models. A model is used in two modes:
//! - free-text completion (answer synthesis)
//! - constrained JSON output (structured query construction), selected by
//!   setting a [`ResponseFormat`] on the request
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Mock**: Scripted responses for tests and offline runs
//!
//! # Example
//! ```no_run
//! use docquery_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "phi3:3.8b");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{MockLlmClient, OllamaClient};
pub use types::{ProviderType, ResponseFormat};
