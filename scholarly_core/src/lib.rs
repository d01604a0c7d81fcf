// src/lib.rs
pub mod config;
pub mod connectors;
pub mod embedding;
pub mod error;
pub mod federated;
pub mod llm;
pub mod pipeline;
pub mod rate_limit;
pub mod rerank;
pub mod store;
pub mod vector;

use crate::connectors::HealthTracker;
use crate::error::ConnectorError;
use crate::federated::{DatabaseInfo, DatabaseStatus, SearchQuery, SearchResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

pub use crate::config::Settings;
pub use crate::federated::FederatedSearch;
pub use crate::pipeline::{PipelineEvent, ResearchPipeline, ResearchRequest};

/// One external academic search provider.
///
/// Implementations own their HTTP client and their normalization from the
/// provider's raw records into [`SearchResult`]s. Connectors are shared across
/// concurrent requests; only the health snapshot is mutated, behind its own lock.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    /// Unique provider name, used for selection and per-provider stats.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Health snapshot storage for this connector.
    fn health(&self) -> &HealthTracker;

    /// Query the provider and normalize its records.
    ///
    /// Records that fail to normalize are replaced with placeholders rather
    /// than failing the batch.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, ConnectorError>;

    /// Provider-specific liveness request used by [`DatabaseConnector::health_check`].
    async fn probe(&self) -> Result<(), ConnectorError>;

    /// Search bounded by `limit`; a timeout becomes [`ConnectorError::Timeout`].
    async fn try_search_with_timeout(
        &self,
        query: &SearchQuery,
        limit: Duration,
    ) -> Result<Vec<SearchResult>, ConnectorError> {
        match tokio::time::timeout(limit, self.search(query)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectorError::Timeout(format!(
                "{} did not respond within {}ms",
                self.name(),
                limit.as_millis()
            ))),
        }
    }

    /// Search bounded by `limit`, returning no results on timeout or error.
    async fn search_with_timeout(&self, query: &SearchQuery, limit: Duration) -> Vec<SearchResult> {
        match self.try_search_with_timeout(query, limit).await {
            Ok(results) => results,
            Err(err) => {
                warn!(
                    database = self.name(),
                    code = err.code_str(),
                    error = %err,
                    "search failed, returning no results"
                );
                Vec::new()
            }
        }
    }

    /// Run the provider probe and record availability, latency and error.
    async fn health_check(&self) -> bool {
        let start = Instant::now();
        match self.probe().await {
            Ok(()) => {
                self.health().record_success(start.elapsed());
                true
            }
            Err(err) => {
                warn!(database = self.name(), error = %err, "health check failed");
                self.health().record_failure(start.elapsed(), err.to_string());
                false
            }
        }
    }

    fn status(&self) -> DatabaseStatus {
        self.health().snapshot()
    }
}

/// Registered connectors keyed by provider name.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    providers: HashMap<String, Arc<dyn DatabaseConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&mut self, provider: Arc<dyn DatabaseConnector>) {
        self.providers
            .insert(provider.name().to_string(), provider);
    }

    pub fn get_provider(&self, name: &str) -> Option<&Arc<dyn DatabaseConnector>> {
        self.providers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Provider names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_providers(&self) -> Vec<DatabaseInfo> {
        let mut infos: Vec<DatabaseInfo> = self
            .providers
            .values()
            .map(|p| DatabaseInfo {
                name: p.name().to_string(),
                description: p.description().to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn DatabaseConnector>> {
        self.providers.values()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Build a registry with every connector enabled at compile time.
///
/// Connectors whose client fails to build are skipped with a warning.
pub fn build_registry_enabled_only(settings: &Settings) -> ConnectorRegistry {
    #[allow(unused_mut)]
    let mut registry = ConnectorRegistry::new();
    let _ = settings;

    #[cfg(feature = "arxiv")]
    {
        match connectors::arxiv::ArxivConnector::new(&settings.arxiv) {
            Ok(connector) => registry.register_provider(Arc::new(connector)),
            Err(e) => warn!(database = "arxiv", error = %e, "connector unavailable"),
        }
    }

    #[cfg(feature = "semantic-scholar")]
    {
        match connectors::semantic_scholar::SemanticScholarConnector::new(
            &settings.semantic_scholar,
        ) {
            Ok(connector) => registry.register_provider(Arc::new(connector)),
            Err(e) => warn!(database = "semantic_scholar", error = %e, "connector unavailable"),
        }
    }

    #[cfg(feature = "searxng")]
    {
        match connectors::searxng::SearxngConnector::new(&settings.searxng) {
            Ok(connector) => registry.register_provider(Arc::new(connector)),
            Err(e) => warn!(database = "searxng", error = %e, "connector unavailable"),
        }
    }

    registry
}
