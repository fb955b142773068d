//! Provider and output-format types.

use serde::{Deserialize, Serialize};

/// Output constraint for a completion.
///
/// `Json` asks the model for any well-formed JSON; `Schema` additionally
/// passes a JSON schema hint that providers supporting it enforce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Json,
    Schema(serde_json::Value),
}

impl ResponseFormat {
    /// Wire value for providers that take a `format` field (Ollama).
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Json => serde_json::Value::String("json".to_string()),
            Self::Schema(schema) => schema.clone(),
        }
    }
}

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Ollama,
    Mock,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }
}
