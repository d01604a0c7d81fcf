//! Federated search execution engine.
//!
//! Fans a query out to the selected connectors in parallel, then merges,
//! deduplicates, scores and sorts what came back.

use super::dedup::{remove_duplicates, DedupOutcome};
use super::scoring::{apply_scores, sort_by_date_desc};
use super::{
    AccessType, DatabaseInfo, DatabaseStatus, FederatedSearchResponse, ProviderFailure,
    SearchQuery, SearchResult, SearchStats,
};
use crate::config::{SearchSettings, DEFAULT_HEALTH_TIMEOUT_SECS, DEFAULT_SEARCH_TIMEOUT_SECS};
use crate::error::ConnectorError;
use crate::{ConnectorRegistry, DatabaseConnector};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// What one provider returned for one federated search.
#[derive(Debug)]
pub struct ProviderOutcome {
    pub database: String,
    pub result: Result<Vec<SearchResult>, ConnectorError>,
}

impl ProviderOutcome {
    pub fn ok(database: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            database: database.into(),
            result: Ok(results),
        }
    }

    pub fn failed(database: impl Into<String>, error: ConnectorError) -> Self {
        Self {
            database: database.into(),
            result: Err(error),
        }
    }
}

/// Engine for executing federated searches across registered connectors.
pub struct FederatedSearch {
    registry: Arc<ConnectorRegistry>,
    default_databases: Vec<String>,
    open_access_databases: Vec<String>,
    timeout: Duration,
    health_timeout: Duration,
}

impl FederatedSearch {
    /// Create an engine with the default provider selection and timeouts.
    pub fn new(registry: Arc<ConnectorRegistry>) -> Self {
        Self::from_settings(registry, &SearchSettings::default())
    }

    pub fn from_settings(registry: Arc<ConnectorRegistry>, settings: &SearchSettings) -> Self {
        Self {
            registry,
            default_databases: settings.default_databases.clone(),
            open_access_databases: settings.open_access_databases.clone(),
            timeout: Duration::from_secs(if settings.timeout_secs == 0 {
                DEFAULT_SEARCH_TIMEOUT_SECS
            } else {
                settings.timeout_secs
            }),
            health_timeout: Duration::from_secs(if settings.health_timeout_secs == 0 {
                DEFAULT_HEALTH_TIMEOUT_SECS
            } else {
                settings.health_timeout_secs
            }),
        }
    }

    /// Override the per-provider search timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn with_default_databases(mut self, databases: Vec<String>) -> Self {
        self.default_databases = databases;
        self
    }

    pub fn with_open_access_databases(mut self, databases: Vec<String>) -> Self {
        self.open_access_databases = databases;
        self
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Providers a query will be sent to.
    ///
    /// An explicit list is filtered to registered names. Otherwise the
    /// configured defaults apply, switching to the open-access set when the
    /// query filters to open documents.
    pub fn resolve_databases(&self, query: &SearchQuery) -> Vec<String> {
        let requested = match query.databases.as_deref() {
            Some(list) if !list.is_empty() => list,
            _ if query.access_filter == Some(AccessType::Open) => &self.open_access_databases[..],
            _ => &self.default_databases[..],
        };

        let mut seen = HashSet::new();
        requested
            .iter()
            .filter(|name| {
                let known = self.registry.contains(name);
                if !known {
                    debug!(database = %name, "ignoring unknown database");
                }
                known && seen.insert(name.as_str())
            })
            .cloned()
            .collect()
    }

    /// Execute a federated search. Provider failures never fail the call.
    pub async fn search(&self, query: &SearchQuery) -> FederatedSearchResponse {
        let start = Instant::now();
        let databases = self.resolve_databases(query);

        if databases.is_empty() {
            warn!(query = %query.query, "no known databases selected for search");
            return FederatedSearchResponse::empty(&query.query);
        }

        let connectors: Vec<(String, Arc<dyn DatabaseConnector>)> = databases
            .iter()
            .filter_map(|name| {
                self.registry
                    .get_provider(name)
                    .map(|c| (name.clone(), Arc::clone(c)))
            })
            .collect();

        let limit = self.timeout;
        let futures = connectors.into_iter().map(|(name, connector)| async move {
            let result = connector.try_search_with_timeout(query, limit).await;
            ProviderOutcome {
                database: name,
                result,
            }
        });
        let outcomes = futures::future::join_all(futures).await;

        let response = aggregate(query, outcomes, start.elapsed());
        info!(
            query = %query.query,
            total = response.stats.total_results,
            duplicates = response.stats.duplicates_removed,
            failed = response.failed_databases.len(),
            elapsed_ms = response.stats.search_time_ms,
            "federated search complete"
        );
        response
    }

    /// Probe every registered provider concurrently.
    ///
    /// Each probe is bounded by the health timeout, so one slow provider does
    /// not hold up reporting on the others.
    pub async fn database_status(&self) -> Vec<DatabaseStatus> {
        let limit = self.health_timeout;
        let probes = self.registry.providers().map(|connector| {
            let connector = Arc::clone(connector);
            async move {
                if timeout(limit, connector.health_check()).await.is_err() {
                    connector
                        .health()
                        .record_failure(limit, "health check timed out");
                }
                connector.status()
            }
        });

        let mut statuses = futures::future::join_all(probes).await;
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub fn available_databases(&self) -> Vec<DatabaseInfo> {
        self.registry.list_providers()
    }
}

/// Merge provider outcomes into a response.
///
/// Applies the access filter per provider, then deduplicates across
/// providers in outcome order, scores, and sorts newest first.
pub fn aggregate(
    query: &SearchQuery,
    outcomes: Vec<ProviderOutcome>,
    elapsed: Duration,
) -> FederatedSearchResponse {
    let mut results_per_database = BTreeMap::new();
    let mut successful_databases = Vec::new();
    let mut failed_databases = Vec::new();
    let mut merged = Vec::new();

    for outcome in outcomes {
        match outcome.result {
            Ok(results) => {
                let kept: Vec<SearchResult> = results
                    .into_iter()
                    .filter(|r| query.access_filter.map_or(true, |want| r.access() == want))
                    .collect();
                results_per_database.insert(outcome.database.clone(), kept.len());
                successful_databases.push(outcome.database);
                merged.extend(kept);
            }
            Err(err) => {
                warn!(
                    database = %outcome.database,
                    code = err.code_str(),
                    error = %err,
                    "database search failed"
                );
                results_per_database.insert(outcome.database.clone(), 0);
                failed_databases.push(ProviderFailure {
                    database: outcome.database,
                    reason: err.to_string(),
                    is_timeout: err.is_timeout(),
                });
            }
        }
    }

    let DedupOutcome {
        mut unique,
        duplicates_removed,
    } = remove_duplicates(merged);
    apply_scores(&mut unique, Utc::now());
    sort_by_date_desc(&mut unique);

    FederatedSearchResponse {
        query: query.query.clone(),
        stats: SearchStats {
            total_results: unique.len(),
            results_per_database,
            search_time_ms: elapsed.as_millis() as u64,
            query_expansion_used: false,
            semantic_search_used: false,
            duplicates_removed,
        },
        results: unique,
        suggestions: Vec::new(),
        related_queries: Vec::new(),
        successful_databases,
        failed_databases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::HealthTracker;
    use crate::federated::AccessInfo;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct StaticConnector {
        name: &'static str,
        health: HealthTracker,
    }

    impl StaticConnector {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                health: HealthTracker::new(name),
            }
        }
    }

    #[async_trait]
    impl DatabaseConnector for StaticConnector {
        fn name(&self) -> &'static str {
            self.name
        }
        fn description(&self) -> &'static str {
            "static"
        }
        fn health(&self) -> &HealthTracker {
            &self.health
        }
        async fn search(&self, _query: &SearchQuery) -> Result<Vec<SearchResult>, ConnectorError> {
            Ok(Vec::new())
        }
        async fn probe(&self) -> Result<(), ConnectorError> {
            Ok(())
        }
    }

    fn engine(names: &[&'static str]) -> FederatedSearch {
        let mut registry = ConnectorRegistry::new();
        for name in names {
            registry.register_provider(Arc::new(StaticConnector::new(name)));
        }
        FederatedSearch::new(Arc::new(registry))
    }

    fn paper(id: &str, title: &str, year: i32, open: bool) -> SearchResult {
        let access = if open {
            AccessInfo::open_access()
        } else {
            AccessInfo::restricted()
        };
        SearchResult::new(id, title, "test", access).with_publication_date(Some(
            Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn resolves_explicit_list_to_known_providers() {
        let engine = engine(&["arxiv", "semantic_scholar"]);
        let query = SearchQuery::new("q").with_databases(["arxiv", "pubmed", "arxiv"]);
        assert_eq!(engine.resolve_databases(&query), vec!["arxiv"]);
    }

    #[test]
    fn default_selection_depends_on_access_filter() {
        let engine = engine(&["arxiv", "semantic_scholar", "searxng"]);
        assert_eq!(
            engine.resolve_databases(&SearchQuery::new("q")),
            vec!["semantic_scholar"]
        );
        let open = SearchQuery::new("q").with_access_filter(Some(AccessType::Open));
        assert_eq!(
            engine.resolve_databases(&open),
            vec!["semantic_scholar", "arxiv"]
        );
    }

    #[test]
    fn aggregate_filters_dedups_and_sorts() {
        let query = SearchQuery::new("retrieval").with_access_filter(Some(AccessType::Open));
        let outcomes = vec![
            ProviderOutcome::ok(
                "arxiv",
                vec![
                    paper("a1", "Retrieval augmented generation", 2020, true),
                    paper("a2", "Closed access retrieval study", 2023, false),
                ],
            ),
            ProviderOutcome::ok(
                "semantic_scholar",
                vec![
                    paper("s1", "Generation, Retrieval Augmented", 2021, true),
                    paper("s2", "Neural ranking models", 2024, true),
                ],
            ),
            ProviderOutcome::failed("searxng", ConnectorError::Other("down".into())),
        ];

        let response = aggregate(&query, outcomes, Duration::from_millis(7));
        let ids: Vec<_> = response.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "a1"]);
        assert_eq!(response.stats.duplicates_removed, 1);
        assert_eq!(response.stats.results_per_database["arxiv"], 1);
        assert_eq!(response.stats.results_per_database["semantic_scholar"], 2);
        assert_eq!(response.stats.results_per_database["searxng"], 0);
        assert_eq!(response.successful_databases, vec!["arxiv", "semantic_scholar"]);
        assert_eq!(response.failed_databases[0].database, "searxng");
        assert!(response.results.iter().all(|r| r.relevance_score > 0.0));
    }

    #[test]
    fn total_failure_is_well_formed_and_empty() {
        let query = SearchQuery::new("q");
        let response = aggregate(
            &query,
            vec![ProviderOutcome::failed(
                "arxiv",
                ConnectorError::Timeout("30s".into()),
            )],
            Duration::ZERO,
        );
        assert!(response.results.is_empty());
        assert_eq!(response.stats.total_results, 0);
        assert_eq!(response.stats.duplicates_removed, 0);
        assert!(response.all_failed());
        assert!(response.failed_databases[0].is_timeout);
    }

    #[tokio::test]
    async fn unknown_databases_yield_empty_response() {
        let engine = engine(&["arxiv"]);
        let response = engine
            .search(&SearchQuery::new("q").with_databases(["nope"]))
            .await;
        assert!(response.results.is_empty());
        assert!(response.successful_databases.is_empty());
    }
}
