//! Configuration management for DocQuery.
//!
//! Configuration is assembled in layers, later layers winning:
//! - Built-in defaults
//! - A YAML config file (`DOCQUERY_CONFIG`, or `./docquery.yaml` when present)
//! - Environment variables
//! - Command-line flags (via [`AppConfig::with_overrides`])
//!
//! The resulting [`AppConfig`] is built once at startup and handed to the
//! component constructors; nothing reads the environment afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Config file looked up in the working directory when `DOCQUERY_CONFIG` is unset.
const DEFAULT_CONFIG_FILE: &str = "docquery.yaml";

const KNOWN_LLM_PROVIDERS: [&str; 2] = ["ollama", "mock"];
const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["ollama", "mock"];
const KNOWN_STORE_BACKENDS: [&str; 2] = ["mongodb", "memory"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Config file the YAML layer was read from, if any
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Document store settings
    pub store: StoreConfig,

    /// Generation model settings
    pub llm: LlmSettings,

    /// Embedding provider settings
    pub embedding: EmbeddingSettings,

    /// Retrieval defaults and self-query schema
    pub retrieval: RetrievalSettings,

    /// Log level override
    #[serde(default)]
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    #[serde(default)]
    pub verbose: bool,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,
}

/// Document store connection and index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Backend: "mongodb" or "memory"
    pub backend: String,

    /// Connection string (MongoDB only)
    #[serde(default)]
    pub uri: Option<String>,

    /// Database name
    #[serde(default)]
    pub database: Option<String>,

    /// Collection name
    #[serde(default)]
    pub collection: Option<String>,

    /// Name of the vector search index
    pub index_name: String,

    /// Document field holding the precomputed embedding
    pub embedding_key: String,

    /// JSON array of documents loaded into the in-memory backend at startup
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

/// Generation model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettings {
    /// Provider: "ollama" or "mock"
    pub provider: String,

    /// Optional endpoint override
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model used for both answer synthesis and filter construction
    pub model: String,

    /// Sampling temperature for answer synthesis
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds; unset means no client-side timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// Provider: "ollama" or "mock"
    pub provider: String,

    /// Optional endpoint override
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Embedding model identifier
    pub model: String,

    /// Embedding dimensionality
    pub dimensions: usize,
}

/// Retrieval defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalSettings {
    /// Number of documents returned when the request does not say
    pub default_k: usize,

    /// What a single document represents, used by the query constructor
    pub document_content_description: String,

    /// Attributes the query constructor may filter on
    pub metadata_schema: Vec<MetadataAttributeConfig>,

    /// Let the model lower k through a `limit` in its structured output
    #[serde(default)]
    pub enable_limit: bool,
}

/// One filterable attribute as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataAttributeConfig {
    /// Dotted field path in the document store
    pub name: String,

    /// "integer", "string" or "enum"
    #[serde(rename = "type")]
    pub attribute_type: String,

    /// Human-readable description shown to the model
    pub description: String,

    /// Allowed values for enum attributes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Partial configuration as read from YAML; every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    store: Option<StoreConfig>,
    llm: Option<LlmSettings>,
    embedding: Option<EmbeddingSettings>,
    retrieval: Option<RetrievalSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "mongodb".to_string(),
            uri: None,
            database: None,
            collection: None,
            index_name: "vector_index".to_string(),
            embedding_key: "embedding".to_string(),
            seed_file: None,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: None,
            model: "phi3:3.8b".to_string(),
            temperature: None,
            timeout_secs: None,
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: None,
            model: "all-minilm".to_string(),
            dimensions: 384,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_k: 3,
            document_content_description: "Brief summary of a movie".to_string(),
            metadata_schema: default_metadata_schema(),
            enable_limit: false,
        }
    }
}

/// Movie collection schema used when the config file does not declare one.
fn default_metadata_schema() -> Vec<MetadataAttributeConfig> {
    vec![
        MetadataAttributeConfig {
            name: "year".to_string(),
            attribute_type: "integer".to_string(),
            description: "Not a date, just the INTEGER representing the year the movie was released"
                .to_string(),
            values: Vec::new(),
        },
        MetadataAttributeConfig {
            name: "imdb.rating".to_string(),
            attribute_type: "integer".to_string(),
            description: "A 1-10 rating for the movie".to_string(),
            values: Vec::new(),
        },
        MetadataAttributeConfig {
            name: "genres".to_string(),
            attribute_type: "enum".to_string(),
            description: "The genres of the movie".to_string(),
            values: [
                "Science fiction",
                "Comedy",
                "Drama",
                "Thriller",
                "Romance",
                "Action",
                "Animated",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        },
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            store: StoreConfig::default(),
            llm: LlmSettings::default(),
            embedding: EmbeddingSettings::default(),
            retrieval: RetrievalSettings::default(),
            log_level: None,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `DOCQUERY_CONFIG`: Path to config file
    /// - `MONGO_URI`, `DB_NAME`, `COLL_NAME`: MongoDB connection
    /// - `INDEX_NAME`, `EMBEDDING_KEY`: Vector index and embedding field
    /// - `DOCUMENT_CONTENT_DESCRIPTION`: Description used for self-querying
    /// - `DOCQUERY_STORE`: Store backend
    /// - `DOCQUERY_SEED_FILE`: Documents for the in-memory backend
    /// - `DOCQUERY_LLM_PROVIDER`, `DOCQUERY_MODEL`: Generation model
    /// - `DOCQUERY_EMBEDDING_PROVIDER`, `DOCQUERY_EMBEDDING_MODEL`: Embeddings
    /// - `OLLAMA_URL`: Endpoint for both Ollama clients
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use docquery_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Index: {}", config.store.index_name);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        let explicit = std::env::var("DOCQUERY_CONFIG").ok().map(PathBuf::from);
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(AppError::Config(format!(
                        "Config file does not exist: {:?}",
                        path
                    )));
                }
                config = config.merge_yaml(&path)?;
            }
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    config = config.merge_yaml(&path)?;
                }
            }
        }

        config.apply_env(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();
        result.config_file = Some(path.to_path_buf());

        if let Some(store) = config_file.store {
            result.store = store;
        }
        if let Some(llm) = config_file.llm {
            result.llm = llm;
        }
        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(result)
    }

    /// Apply environment overrides through a lookup function.
    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("MONGO_URI") {
            self.store.uri = Some(uri);
        }
        if let Some(db) = lookup("DB_NAME") {
            self.store.database = Some(db);
        }
        if let Some(coll) = lookup("COLL_NAME") {
            self.store.collection = Some(coll);
        }
        if let Some(index) = lookup("INDEX_NAME") {
            self.store.index_name = index;
        }
        if let Some(key) = lookup("EMBEDDING_KEY") {
            self.store.embedding_key = key;
        }
        if let Some(backend) = lookup("DOCQUERY_STORE") {
            self.store.backend = backend;
        }
        if let Some(seed) = lookup("DOCQUERY_SEED_FILE") {
            self.store.seed_file = Some(PathBuf::from(seed));
        }
        if let Some(description) = lookup("DOCUMENT_CONTENT_DESCRIPTION") {
            self.retrieval.document_content_description = description;
        }
        if let Some(provider) = lookup("DOCQUERY_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = lookup("DOCQUERY_MODEL") {
            self.llm.model = model;
        }
        if let Some(provider) = lookup("DOCQUERY_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Some(model) = lookup("DOCQUERY_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.llm.endpoint = Some(url.clone());
            self.embedding.endpoint = Some(url);
        }
        if let Some(level) = lookup("RUST_LOG") {
            self.log_level = Some(level);
        }
        if lookup("NO_COLOR").is_some() {
            self.no_color = true;
        }
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over the file and the environment.
    pub fn with_overrides(
        mut self,
        store: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(store) = store {
            self.store.backend = store;
        }

        if let Some(model) = model {
            self.llm.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Validate the assembled configuration.
    pub fn validate(&self) -> AppResult<()> {
        check_known("LLM provider", &self.llm.provider, &KNOWN_LLM_PROVIDERS)?;
        check_known(
            "embedding provider",
            &self.embedding.provider,
            &KNOWN_EMBEDDING_PROVIDERS,
        )?;
        check_known("store backend", &self.store.backend, &KNOWN_STORE_BACKENDS)?;

        if self.store.backend == "mongodb" {
            let missing: Vec<&str> = [
                ("MONGO_URI", &self.store.uri),
                ("DB_NAME", &self.store.database),
                ("COLL_NAME", &self.store.collection),
            ]
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
            .map(|(name, _)| *name)
            .collect();

            if !missing.is_empty() {
                return Err(AppError::Config(format!(
                    "MongoDB store requires: {}",
                    missing.join(", ")
                )));
            }
        }

        if self.store.embedding_key.is_empty() || self.store.index_name.is_empty() {
            return Err(AppError::Config(
                "Embedding key and index name cannot be empty".to_string(),
            ));
        }

        if self.retrieval.default_k == 0 {
            return Err(AppError::Config("defaultK must be positive".to_string()));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_known(what: &str, value: &str, known: &[&str]) -> AppResult<()> {
    if known.contains(&value) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "Unknown {}: {}. Supported: {}",
            what,
            value,
            known.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.backend = "memory".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "phi3:3.8b");
        assert_eq!(config.store.embedding_key, "embedding");
        assert_eq!(config.retrieval.default_k, 3);
        assert_eq!(config.retrieval.metadata_schema.len(), 3);
        assert!(!config.verbose);
    }

    #[test]
    fn test_apply_env() {
        let env: HashMap<&str, &str> = [
            ("MONGO_URI", "mongodb://localhost:27017"),
            ("DB_NAME", "sample_mflix"),
            ("COLL_NAME", "movies"),
            ("INDEX_NAME", "plot_index"),
            ("EMBEDDING_KEY", "plot_embedding"),
            ("OLLAMA_URL", "http://ollama:11434"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.store.database.as_deref(), Some("sample_mflix"));
        assert_eq!(config.store.collection.as_deref(), Some("movies"));
        assert_eq!(config.store.index_name, "plot_index");
        assert_eq!(config.store.embedding_key, "plot_embedding");
        assert_eq!(config.llm.endpoint.as_deref(), Some("http://ollama:11434"));
        assert_eq!(config.embedding.endpoint.as_deref(), Some("http://ollama:11434"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("docquery.yaml");
        fs::write(
            &path,
            r#"
store:
  backend: memory
  indexName: idx
  embeddingKey: vec
retrieval:
  defaultK: 5
  documentContentDescription: "A recipe"
  metadataSchema:
    - name: cuisine
      type: enum
      description: Cuisine of the dish
      values: [Italian, Thai]
logging:
  level: warn
  color: false
"#,
        )
        .unwrap();

        let config = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.store.embedding_key, "vec");
        assert_eq!(config.retrieval.default_k, 5);
        assert_eq!(config.retrieval.metadata_schema[0].values.len(), 2);
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert!(config.no_color);
        assert_eq!(config.config_file, Some(path));
    }

    #[test]
    fn test_merge_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yaml");
        fs::write(&path, "store: [unclosed").unwrap();
        assert!(AppConfig::default().merge_yaml(&path).is_err());
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default().with_overrides(
            Some("memory".to_string()),
            Some("llama3.2".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.llm.model, "llama3.2");
        assert!(config.verbose);
        assert_eq!(config.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_validate_mongodb_requires_connection() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("MONGO_URI"));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = memory_config();
        config.llm.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_k() {
        let mut config = memory_config();
        config.retrieval.default_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_memory_store() {
        assert!(memory_config().validate().is_ok());
    }
}
