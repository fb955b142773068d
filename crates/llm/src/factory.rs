//! LLM provider factory.
//!
//! Builds the process-wide generation client from configuration. The
//! returned handle is created once at startup and shared by every request.

use crate::client::LlmClient;
use crate::providers::ollama::DEFAULT_OLLAMA_URL;
use crate::providers::{MockLlmClient, OllamaClient};
use crate::types::ProviderType;
use docquery_core::config::LlmSettings;
use docquery_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client from the configured provider settings.
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown, or
/// `AppError::Llm` if the HTTP client cannot be built.
pub fn create_client(settings: &LlmSettings) -> AppResult<Arc<dyn LlmClient>> {
    let provider = ProviderType::parse(&settings.provider).ok_or_else(|| {
        AppError::Config(format!("Unknown LLM provider: {}", settings.provider))
    })?;

    match provider {
        ProviderType::Ollama => {
            let base_url = settings.endpoint.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            let client = match settings.timeout_secs {
                Some(secs) => OllamaClient::with_timeout(base_url, Duration::from_secs(secs))?,
                None => OllamaClient::with_base_url(base_url),
            };
            tracing::debug!("Created Ollama client at {}", base_url);
            Ok(Arc::new(client))
        }
        ProviderType::Mock => {
            tracing::warn!("Using mock LLM provider; answers are canned");
            Ok(Arc::new(MockLlmClient::with_fallback(
                r#"{"query": "", "filter": "NO_FILTER"}"#,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client(&LlmSettings::default()).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_timeout() {
        let settings = LlmSettings {
            endpoint: Some("http://localhost:8080".to_string()),
            timeout_secs: Some(5),
            ..LlmSettings::default()
        };
        assert!(create_client(&settings).is_ok());
    }

    #[test]
    fn test_create_mock_client() {
        let settings = LlmSettings {
            provider: "mock".to_string(),
            ..LlmSettings::default()
        };
        assert_eq!(create_client(&settings).unwrap().provider_name(), "mock");
    }

    #[test]
    fn test_unknown_provider() {
        let settings = LlmSettings {
            provider: "unknown".to_string(),
            ..LlmSettings::default()
        };
        match create_client(&settings) {
            Err(err) => assert!(err.to_string().contains("Unknown LLM provider")),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
