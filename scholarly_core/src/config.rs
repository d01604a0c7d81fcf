//! Runtime settings.
//!
//! Settings are read from a TOML file (default `~/.config/scholarly/config.toml`),
//! then overridden from environment variables. Every field has a default, so a
//! missing file is not an error.

use crate::error::ConfigError;
use crate::federated::{AccessType, MAX_RESULTS_LIMIT};
use crate::pipeline::PipelineSettings;
use crate::store::ChunkingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// Default Values
// ============================================================================

/// Per-provider search timeout in seconds
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 30;

/// Per-provider health probe timeout in seconds
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_COLLECTION: &str = "research_documents";

fn default_databases() -> Vec<String> {
    vec!["semantic_scholar".to_string()]
}

fn default_open_access_databases() -> Vec<String> {
    vec!["semantic_scholar".to_string(), "arxiv".to_string()]
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Providers queried when a request names none
    pub default_databases: Vec<String>,
    /// Providers queried when a request names none and filters to open access
    pub open_access_databases: Vec<String>,
    pub timeout_secs: u64,
    pub health_timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_databases: default_databases(),
            open_access_databases: default_open_access_databases(),
            timeout_secs: DEFAULT_SEARCH_TIMEOUT_SECS,
            health_timeout_secs: DEFAULT_HEALTH_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArxivSettings {
    pub base_url: String,
}

impl Default for ArxivSettings {
    fn default() -> Self {
        Self {
            base_url: "http://export.arxiv.org/api/query".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticScholarSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub requests_per_minute: u32,
}

impl Default for SemanticScholarSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.semanticscholar.org/graph/v1".to_string(),
            requests_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearxngSettings {
    pub base_url: String,
    pub exclude_authorless: bool,
    pub exclude_abstractless: bool,
    pub exclude_publisherless: bool,
    /// Access type attached to every SearxNG result
    pub report_access: AccessType,
}

impl Default for SearxngSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            exclude_authorless: false,
            exclude_abstractless: false,
            exclude_publisherless: false,
            report_access: AccessType::Restricted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    #[default]
    Mistral,
    /// Local character-trigram hashing, no network
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingBackend,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Vector size for the hashing backend
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Mistral,
            api_key: None,
            base_url: "https://api.mistral.ai".to_string(),
            model: "mistral-embed".to_string(),
            dimensions: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    #[default]
    Memory,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    pub backend: VectorBackend,
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Memory,
            url: "http://localhost:6333".to_string(),
            api_key: None,
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub top_n: usize,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.cohere.com".to_string(),
            model: "rerank-v3.5".to_string(),
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.mistral.ai".to_string(),
            model: "mistral-medium-latest".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub arxiv: ArxivSettings,
    pub semantic_scholar: SemanticScholarSettings,
    pub searxng: SearxngSettings,
    pub embedding: EmbeddingSettings,
    pub vector_store: VectorStoreSettings,
    pub chunking: ChunkingConfig,
    pub rerank: RerankSettings,
    pub llm: LlmSettings,
    pub pipeline: PipelineSettings,
}

impl Settings {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("scholarly").join("config.toml")
    }

    /// Load from `path` (or the default location), apply environment overrides
    /// and validate.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env_from(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from `lookup`, usually the process environment.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = lookup("MISTRAL_API_KEY") {
            self.llm.api_key = Some(key.clone());
            self.embedding.api_key = Some(key);
        }
        if let Some(key) = lookup("COHERE_API_KEY") {
            self.rerank.api_key = Some(key);
        }
        if let Some(key) = lookup("SEMANTIC_SCHOLAR_API_KEY") {
            self.semantic_scholar.api_key = Some(key);
        }
        if let Some(url) = lookup("SEARXNG_BASE_URL") {
            self.searxng.base_url = url;
        }
        if let Some(url) = lookup("QDRANT_URL") {
            self.vector_store.url = url;
        }
        if let Some(model) = lookup("MISTRAL_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(v) = lookup("RAG_TOP_K") {
            self.pipeline.top_k = parse_env("RAG_TOP_K", &v)?;
        }
        if let Some(v) = lookup("RAG_DATABASE_CANDIDATES") {
            self.pipeline.database_candidates = parse_env("RAG_DATABASE_CANDIDATES", &v)?;
        }
        if let Some(v) = lookup("RAG_MAX_DATABASE_QUERIES") {
            self.pipeline.max_database_queries = parse_env("RAG_MAX_DATABASE_QUERIES", &v)?;
        }
        if let Some(v) = lookup("RAG_CHUNK_SIZE") {
            self.chunking.chunk_size = parse_env("RAG_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("RAG_CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_env("RAG_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = lookup("COHERE_TOP_N") {
            self.rerank.top_n = parse_env("COHERE_TOP_N", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunking.chunk_size must be > 0".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.search.timeout_secs == 0 {
            return Err(ConfigError::Invalid("search.timeout_secs must be > 0".into()));
        }
        if !(1..=MAX_RESULTS_LIMIT).contains(&self.pipeline.database_candidates) {
            return Err(ConfigError::Invalid(format!(
                "pipeline.database_candidates must be between 1 and {}",
                MAX_RESULTS_LIMIT
            )));
        }
        if self.pipeline.top_k == 0 {
            return Err(ConfigError::Invalid("pipeline.top_k must be > 0".into()));
        }
        if self.pipeline.max_database_queries == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_database_queries must be > 0".into(),
            ));
        }
        if self.embedding.provider == EmbeddingBackend::Hashing && self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "embedding.dimensions must be > 0 for the hashing backend".into(),
            ));
        }
        Ok(())
    }

    pub fn search_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.search.timeout_secs)
    }

    pub fn health_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.search.health_timeout_secs)
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has invalid value '{}'", key, value)))
}
