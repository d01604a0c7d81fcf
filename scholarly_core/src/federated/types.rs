//! Core types for federated academic search.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Default Values
// ============================================================================

/// Default results requested from each provider
pub const DEFAULT_MAX_RESULTS: u32 = 20;

/// Upper bound on results requested from each provider
pub const MAX_RESULTS_LIMIT: u32 = 100;

// ============================================================================
// Access classification
// ============================================================================

/// Binary projection of [`AccessInfo`] used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Open,
    Restricted,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Open => "open",
            AccessType::Restricted => "restricted",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(AccessType::Open),
            "restricted" => Ok(AccessType::Restricted),
            other => Err(format!(
                "unknown access type '{}', expected 'open' or 'restricted'",
                other
            )),
        }
    }
}

/// Provider-reported access status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    OpenAccess,
    Licensed,
    Restricted,
    #[default]
    Unknown,
}

/// Access details for a single document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessInfo {
    pub is_open_access: bool,

    pub access_kind: AccessKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,

    /// Direct link to a full-text PDF, when the provider exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
}

impl AccessInfo {
    pub fn open_access() -> Self {
        Self {
            is_open_access: true,
            access_kind: AccessKind::OpenAccess,
            ..Self::default()
        }
    }

    pub fn licensed() -> Self {
        Self {
            is_open_access: false,
            access_kind: AccessKind::Licensed,
            ..Self::default()
        }
    }

    pub fn restricted() -> Self {
        Self {
            is_open_access: false,
            access_kind: AccessKind::Restricted,
            ..Self::default()
        }
    }

    /// Build access info that projects back onto the given access type.
    pub fn from_access_type(access: AccessType) -> Self {
        match access {
            AccessType::Open => Self::open_access(),
            AccessType::Restricted => Self::restricted(),
        }
    }

    pub fn with_license(mut self, license: impl Into<String>, url: Option<String>) -> Self {
        self.license = Some(license.into());
        self.license_url = url;
        self
    }

    pub fn with_pdf_url(mut self, pdf_url: impl Into<String>) -> Self {
        self.pdf_url = Some(pdf_url.into());
        self
    }

    pub fn with_repository_url(mut self, url: impl Into<String>) -> Self {
        self.repository_url = Some(url.into());
        self
    }

    /// `open_access` maps to [`AccessType::Open`]; every other kind is restricted.
    pub fn access_type(&self) -> AccessType {
        match self.access_kind {
            AccessKind::OpenAccess => AccessType::Open,
            _ => AccessType::Restricted,
        }
    }
}

// ============================================================================
// Query
// ============================================================================

/// Inclusive publication-year bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_year: Option<i32>,
}

impl DateRange {
    pub fn new(start_year: Option<i32>, end_year: Option<i32>) -> Self {
        Self {
            start_year,
            end_year,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_year.is_none() && self.end_year.is_none()
    }
}

/// A federated search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,

    /// Explicit provider names; `None` selects the configured defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub databases: Option<Vec<String>>,

    /// Results requested from each provider (1..=100)
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,

    /// Provider-specific filters, e.g. `{"categories": ["cs.CL"]}` for arXiv
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub filters: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_filter: Option<AccessType>,
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            databases: None,
            max_results: DEFAULT_MAX_RESULTS,
            date_range: None,
            filters: Map::new(),
            access_filter: None,
        }
    }

    pub fn with_databases<I, S>(mut self, databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.databases = Some(databases.into_iter().map(Into::into).collect());
        self
    }

    /// Set the per-provider result count, clamped to `1..=MAX_RESULTS_LIMIT`.
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.clamp(1, MAX_RESULTS_LIMIT);
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = if range.is_empty() { None } else { Some(range) };
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.filters.insert(key.into(), value);
        self
    }

    pub fn with_access_filter(mut self, access: Option<AccessType>) -> Self {
        self.access_filter = access;
        self
    }

    /// String values of a filter, accepting either a single string or an array.
    pub fn filter_values(&self, key: &str) -> Vec<String> {
        match self.filters.get(key) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Check the bounds a deserialized query cannot enforce on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        if !(1..=MAX_RESULTS_LIMIT).contains(&self.max_results) {
            return Err(format!(
                "max_results must be between 1 and {}, got {}",
                MAX_RESULTS_LIMIT, self.max_results
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,

    /// Provider author id or ORCID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: None,
            identifier: None,
        }
    }

    pub fn with_affiliation(mut self, affiliation: Option<String>) -> Self {
        self.affiliation = affiliation;
        self
    }

    pub fn with_identifier(mut self, identifier: Option<String>) -> Self {
        self.identifier = identifier;
        self
    }
}

/// A normalized document from any academic provider.
///
/// Connectors build these from raw provider records; the aggregator fills in
/// the score fields. The access type is fixed when the result is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Identifier within the source provider
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub authors: Vec<Author>,

    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    /// Publishing outlet as resolved by the provider (venue, journal or index)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Name of the connector that produced this result (e.g. "arxiv")
    pub source_database: String,

    access_info: AccessInfo,

    access: AccessType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,

    #[serde(default)]
    pub relevance_score: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f32>,

    #[serde(default)]
    pub citation_score: f32,

    #[serde(default)]
    pub recency_score: f32,

    /// Provider-specific fields kept for display and debugging
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw_metadata: Value,
}

impl SearchResult {
    /// Create a result; the access type is derived from `access_info`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source_database: impl Into<String>,
        access_info: AccessInfo,
    ) -> Self {
        let access = access_info.access_type();
        Self {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            abstract_text: None,
            publication_date: None,
            journal: None,
            venue: None,
            publisher: None,
            doi: None,
            url: None,
            source_database: source_database.into(),
            access_info,
            access,
            citation_count: None,
            reference_count: None,
            keywords: Vec::new(),
            subjects: Vec::new(),
            document_type: None,
            relevance_score: 0.0,
            semantic_score: None,
            citation_score: 0.0,
            recency_score: 0.0,
            raw_metadata: Value::Null,
        }
    }

    /// Minimal stand-in for a provider record that could not be normalized.
    pub fn placeholder(source_database: &str, index: usize, title: &str) -> Self {
        Self::new(
            format!("{}_{}", source_database, index),
            title,
            source_database,
            AccessInfo::restricted(),
        )
    }

    pub fn access(&self) -> AccessType {
        self.access
    }

    pub fn access_info(&self) -> &AccessInfo {
        &self.access_info
    }

    pub fn year(&self) -> Option<i32> {
        self.publication_date.map(|d| d.year())
    }

    pub fn with_authors(mut self, authors: Vec<Author>) -> Self {
        self.authors = authors;
        self
    }

    pub fn with_abstract(mut self, abstract_text: Option<String>) -> Self {
        self.abstract_text = abstract_text.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn with_publication_date(mut self, date: Option<DateTime<Utc>>) -> Self {
        self.publication_date = date;
        self
    }

    pub fn with_journal(mut self, journal: Option<String>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_venue(mut self, venue: Option<String>) -> Self {
        self.venue = venue;
        self
    }

    pub fn with_publisher(mut self, publisher: Option<String>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_doi(mut self, doi: Option<String>) -> Self {
        self.doi = doi.filter(|d| !d.is_empty());
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_citation_count(mut self, count: Option<u64>) -> Self {
        self.citation_count = count;
        self
    }

    pub fn with_reference_count(mut self, count: Option<u64>) -> Self {
        self.reference_count = count;
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_subjects(mut self, subjects: Vec<String>) -> Self {
        self.subjects = subjects;
        self
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    pub fn with_raw_metadata(mut self, raw: Value) -> Self {
        self.raw_metadata = raw;
        self
    }
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub total_results: usize,

    /// Post-filter result count per queried provider; failed providers report 0
    pub results_per_database: BTreeMap<String, usize>,

    pub search_time_ms: u64,

    pub query_expansion_used: bool,

    pub semantic_search_used: bool,

    pub duplicates_removed: usize,
}

/// Why a provider contributed nothing to a federated search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub database: String,
    pub reason: String,
    pub is_timeout: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FederatedSearchResponse {
    pub query: String,

    /// Deduplicated results, newest first
    pub results: Vec<SearchResult>,

    pub stats: SearchStats,

    #[serde(default)]
    pub suggestions: Vec<String>,

    #[serde(default)]
    pub related_queries: Vec<String>,

    #[serde(default)]
    pub successful_databases: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_databases: Vec<ProviderFailure>,
}

impl FederatedSearchResponse {
    /// Well-formed response with no results and zeroed stats.
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn all_failed(&self) -> bool {
        self.successful_databases.is_empty() && !self.failed_databases.is_empty()
    }
}

/// Health snapshot for one provider, overwritten on every check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStatus {
    pub name: String,
    pub is_available: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

impl DatabaseStatus {
    /// Status before the first health check: not known to be available.
    pub fn unchecked(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_available: false,
            response_time_ms: None,
            last_error: None,
            last_checked: None,
        }
    }
}

/// Registered provider, as listed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub description: String,
}
