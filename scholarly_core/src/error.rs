// src/error.rs

/// Failures raised by a single search provider.
///
/// These never escape the federated aggregator; they are recorded per
/// provider and the provider contributes zero results.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ConnectorError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ConnectorError::InvalidInput(_) => "invalid_input",
            ConnectorError::ParseError(_) | ConnectorError::SerdeJson(_) => "parse_error",
            ConnectorError::RateLimited => "rate_limited",
            ConnectorError::Timeout(_) => "timeout",
            ConnectorError::HttpRequest(_) | ConnectorError::Provider { .. } => "upstream_error",
            ConnectorError::Other(_) => "internal_error",
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            ConnectorError::Timeout(_) => true,
            ConnectorError::HttpRequest(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Failures from the embedding provider or the vector store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Embedding provider error: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Collection missing or unusable: {0}")]
    CollectionMissing(String),

    #[error("Vector store backend error: {0}")]
    Backend(String),

    #[error("Vector store unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether destroying and recreating the collection may clear this error.
    ///
    /// Only schema problems qualify. Outages, rejected requests and embedding
    /// failures leave the stored documents alone.
    pub fn is_index_failure(&self) -> bool {
        matches!(
            self,
            StoreError::DimensionMismatch { .. } | StoreError::CollectionMissing(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RerankError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rerank provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid rerank response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("LLM provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key for {0}")]
    MissingApiKey(&'static str),
}

/// Failures that terminate a research pipeline run with an error event.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_failures_are_classified() {
        assert!(StoreError::DimensionMismatch {
            expected: 1024,
            actual: 384
        }
        .is_index_failure());
        assert!(StoreError::CollectionMissing("papers".into()).is_index_failure());
        assert!(!StoreError::Backend("bad request".into()).is_index_failure());
        assert!(!StoreError::Unavailable("503".into()).is_index_failure());
        assert!(!StoreError::Embedding("quota".into()).is_index_failure());
    }

    #[test]
    fn connector_codes() {
        assert_eq!(ConnectorError::Timeout("30s".into()).code_str(), "timeout");
        assert!(ConnectorError::Timeout("30s".into()).is_timeout());
        assert_eq!(ConnectorError::RateLimited.code_str(), "rate_limited");
    }
}
