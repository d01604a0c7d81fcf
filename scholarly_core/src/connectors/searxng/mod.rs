use crate::config::SearxngSettings;
use crate::connectors::{HealthTracker, USER_AGENT};
use crate::error::ConnectorError;
use crate::federated::normalize::{
    clean_doi, clean_optional, clean_text, extract_authors, parse_date,
};
use crate::federated::{AccessInfo, AccessType, SearchQuery, SearchResult};
use crate::DatabaseConnector;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

const NAME: &str = "searxng";

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    unresponsive_engines: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearxngRecord {
    title: String,
    url: Option<String>,
    content: Option<String>,
    published_date: Option<String>,
    doi: Option<String>,
    /// Engines disagree: a list of names, a list of objects or one string.
    #[serde(default)]
    authors: Value,
    journal: Option<String>,
    publisher: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(rename = "pdf_url")]
    pdf_url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Science-category search through a self-hosted SearxNG instance.
pub struct SearxngConnector {
    client: Client,
    base_url: String,
    report_access: AccessType,
    exclude_authorless: bool,
    exclude_abstractless: bool,
    exclude_publisherless: bool,
    health: HealthTracker,
}

impl SearxngConnector {
    pub fn new(settings: &SearxngSettings) -> Result<Self, ConnectorError> {
        if settings.base_url.trim().is_empty() {
            return Err(ConnectorError::InvalidInput(
                "searxng.base_url must be set to use SearxNG".to_string(),
            ));
        }
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            report_access: settings.report_access,
            exclude_authorless: settings.exclude_authorless,
            exclude_abstractless: settings.exclude_abstractless,
            exclude_publisherless: settings.exclude_publisherless,
            health: HealthTracker::new(NAME),
        })
    }

    fn build_url(&self, query: &str) -> Result<Url, ConnectorError> {
        let mut url = Url::parse(&format!("{}/search", self.base_url))
            .map_err(|e| ConnectorError::InvalidInput(format!("Failed to parse URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("category", "science")
            .append_pair("pageno", "1")
            .append_pair("language", "all")
            .append_pair("safesearch", "0")
            .append_pair("format", "json");
        Ok(url)
    }

    /// Whether the configured exclusions drop this raw record.
    fn is_excluded(&self, raw: &Value) -> bool {
        let empty_str = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .map_or(true, |s| s.trim().is_empty())
        };
        let no_authors = raw.get("authors").map_or(true, |a| extract_authors(a).is_empty());

        (self.exclude_authorless && no_authors)
            || (self.exclude_abstractless && empty_str("content"))
            || (self.exclude_publisherless && empty_str("publisher"))
    }

    fn normalize(&self, raw: &Value) -> Result<SearchResult, ConnectorError> {
        let record: SearxngRecord = serde_json::from_value(raw.clone())?;
        let title = clean_text(&record.title);
        if title.is_empty() {
            return Err(ConnectorError::ParseError("result has no title".to_string()));
        }

        let mut access = AccessInfo::from_access_type(self.report_access);
        if let Some(pdf) = record.pdf_url.as_deref().filter(|u| !u.is_empty()) {
            access = access.with_pdf_url(pdf);
        }

        let authors = extract_authors(&record.authors);

        let publisher =
            clean_optional(record.publisher.as_deref()).unwrap_or_else(|| "SearxNG".to_string());

        let kind = record.kind;
        let mut result = SearchResult::new(title.clone(), title, NAME, access)
            .with_authors(authors)
            .with_abstract(clean_optional(record.content.as_deref()))
            .with_publication_date(record.published_date.as_deref().and_then(parse_date))
            .with_journal(clean_optional(record.journal.as_deref()))
            .with_publisher(Some(publisher))
            .with_doi(record.doi.as_deref().and_then(clean_doi))
            .with_url(record.url)
            .with_keywords(record.tags.unwrap_or_default())
            .with_raw_metadata(json!({ "engine": raw.get("engine") }));
        if let Some(kind) = kind.filter(|k| !k.is_empty()) {
            result = result.with_document_type(kind);
        }
        Ok(result)
    }
}

#[async_trait]
impl DatabaseConnector for SearxngConnector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "SearxNG metasearch over science engines (Google Scholar, CrossRef, PubMed, ...)"
    }

    fn health(&self) -> &HealthTracker {
        &self.health
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, ConnectorError> {
        let url = self.build_url(&query.query)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::Provider {
                status: status.as_u16(),
                message: "SearxNG returned an error status".to_string(),
            });
        }

        let body: SearxngResponse = response.json().await?;
        if !body.unresponsive_engines.is_empty() {
            debug!(engines = ?body.unresponsive_engines, "SearxNG engines did not respond");
        }

        Ok(body
            .results
            .iter()
            .filter(|raw| !self.is_excluded(raw))
            .take(query.max_results as usize)
            .enumerate()
            .map(|(idx, raw)| {
                self.normalize(raw).unwrap_or_else(|err| {
                    warn!(database = NAME, error = %err, "malformed SearxNG result");
                    SearchResult::placeholder(NAME, idx, "Untitled")
                })
            })
            .collect())
    }

    async fn probe(&self) -> Result<(), ConnectorError> {
        let url = format!("{}/healthz", self.base_url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ConnectorError::Provider {
                status: status.as_u16(),
                message: "SearxNG health endpoint failed".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(settings: SearxngSettings) -> SearxngConnector {
        SearxngConnector::new(&settings).unwrap()
    }

    #[test]
    fn builds_science_query_url() {
        let c = connector(SearxngSettings {
            base_url: "http://searx.local:8080/".into(),
            ..SearxngSettings::default()
        });
        let url = c.build_url("protein folding").unwrap().to_string();
        assert!(url.starts_with("http://searx.local:8080/search?q=protein+folding"));
        assert!(url.contains("category=science"));
        assert!(url.ends_with("format=json"));
    }

    #[test]
    fn normalizes_with_reported_access_and_publisher_fallback() {
        let c = connector(SearxngSettings {
            report_access: AccessType::Open,
            ..SearxngSettings::default()
        });
        let raw = json!({
            "title": "CRISPR screens at scale",
            "url": "https://example.org/crispr",
            "content": "A   study.",
            "publishedDate": "2022-03-01T00:00:00",
            "authors": ["J. Doe", ""],
            "doi": "https://doi.org/10.1/crispr",
            "engine": "crossref"
        });
        let result = c.normalize(&raw).unwrap();
        assert_eq!(result.access(), AccessType::Open);
        assert_eq!(result.publisher.as_deref(), Some("SearxNG"));
        assert_eq!(result.abstract_text.as_deref(), Some("A study."));
        assert_eq!(result.doi.as_deref(), Some("10.1/crispr"));
        assert_eq!(result.authors.len(), 1);
        assert_eq!(result.year(), Some(2022));
        assert_eq!(result.source_database, "searxng");
    }

    #[test]
    fn authors_as_string_or_objects() {
        let c = connector(SearxngSettings::default());
        let joined = c
            .normalize(&json!({"title": "A", "authors": "Smith J, Jones A"}))
            .unwrap();
        assert_eq!(joined.authors.len(), 2);

        let objects = c
            .normalize(&json!({"title": "B", "authors": [{"name": "Ada Lovelace"}]}))
            .unwrap();
        assert_eq!(objects.authors[0].name, "Ada Lovelace");
    }

    #[test]
    fn exclusions_drop_incomplete_records() {
        let c = connector(SearxngSettings {
            exclude_authorless: true,
            exclude_publisherless: true,
            ..SearxngSettings::default()
        });
        assert!(c.is_excluded(&json!({"title": "x", "publisher": "ACM"})));
        assert!(c.is_excluded(&json!({"title": "x", "authors": ["A"]})));
        assert!(!c.is_excluded(&json!({"title": "x", "authors": ["A"], "publisher": "ACM"})));
        assert!(!c.is_excluded(&json!({"title": "x", "authors": "Smith J", "publisher": "ACM"})));

        let lenient = connector(SearxngSettings::default());
        assert!(!lenient.is_excluded(&json!({"title": "x"})));
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let settings = SearxngSettings {
            base_url: " ".into(),
            ..SearxngSettings::default()
        };
        assert!(SearxngConnector::new(&settings).is_err());
    }
}
