//! Generation model provider implementations.

pub mod mock;
pub mod ollama;

pub use mock::MockLlmClient;
pub use ollama::OllamaClient;
