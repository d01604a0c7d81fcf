use crate::config::SemanticScholarSettings;
use crate::connectors::{HealthTracker, USER_AGENT};
use crate::error::ConnectorError;
use crate::federated::normalize::{clean_doi, clean_optional, clean_text, parse_date, year_start};
use crate::federated::{AccessInfo, Author, DateRange, SearchQuery, SearchResult};
use crate::rate_limit::RateLimiter;
use crate::DatabaseConnector;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

const NAME: &str = "semantic_scholar";

const SEARCH_FIELDS: &str = "paperId,title,abstract,authors,year,publicationDate,citationCount,\
referenceCount,url,journal,venue,publicationTypes,publicationVenue,externalIds,isOpenAccess,\
openAccessPdf,fieldsOfStudy";

const MAX_LIMIT_PER_REQUEST: u32 = 100;

// Define the structs for deserializing the API responses
#[derive(Debug, Deserialize)]
struct PaperSearchResponse {
    #[serde(default)]
    data: Vec<Value>,
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paper {
    paper_id: String,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_field: Option<String>,
    #[serde(default)]
    authors: Vec<PaperAuthor>,
    year: Option<i32>,
    publication_date: Option<String>,
    citation_count: Option<u64>,
    reference_count: Option<u64>,
    url: Option<String>,
    journal: Option<Journal>,
    venue: Option<String>,
    #[serde(default)]
    publication_types: Option<Vec<String>>,
    publication_venue: Option<PublicationVenue>,
    external_ids: Option<ExternalIds>,
    is_open_access: Option<bool>,
    open_access_pdf: Option<OpenAccessPdf>,
    #[serde(default)]
    fields_of_study: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct PaperAuthor {
    #[serde(rename = "authorId")]
    author_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Journal {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublicationVenue {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessPdf {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
    #[serde(rename = "PubMed")]
    pubmed: Option<String>,
    #[serde(rename = "DBLP")]
    dblp: Option<String>,
    #[serde(rename = "ACL")]
    acl: Option<String>,
}

pub struct SemanticScholarConnector {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    limiter: RateLimiter,
    health: HealthTracker,
}

impl SemanticScholarConnector {
    pub fn new(settings: &SemanticScholarSettings) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(SemanticScholarConnector {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::per_minute(settings.requests_per_minute),
            health: HealthTracker::new(NAME),
        })
    }

    fn build_search_url(base_url: &str, query: &str, limit: u32, year: Option<&DateRange>) -> String {
        let mut url = format!(
            "{}/paper/search?query={}&limit={}&offset=0&fields={}",
            base_url,
            urlencoding::encode(query),
            limit.clamp(1, MAX_LIMIT_PER_REQUEST),
            SEARCH_FIELDS
        );

        if let Some(range) = year.filter(|r| !r.is_empty()) {
            let start = range.start_year.map(|y| y.to_string()).unwrap_or_default();
            let end = range.end_year.map(|y| y.to_string()).unwrap_or_default();
            url.push_str(&format!("&year={}-{}", start, end));
        }

        url
    }

    async fn search_page(&self, url: &str) -> Result<PaperSearchResponse, ConnectorError> {
        self.limiter.acquire().await;

        let mut request = self.client.get(url);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(ConnectorError::RateLimited),
            status if !status.is_success() => {
                let message = response.text().await.unwrap_or_default();
                return Err(ConnectorError::Provider {
                    status: status.as_u16(),
                    message,
                });
            }
            _ => {}
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ConnectorError::ParseError(format!("Failed to parse Semantic Scholar response: {}", e))
        })
    }

    fn normalize(raw: &Value) -> Result<SearchResult, ConnectorError> {
        let paper: Paper = serde_json::from_value(raw.clone())?;
        let title = clean_optional(paper.title.as_deref())
            .ok_or_else(|| ConnectorError::ParseError(format!("paper {} has no title", paper.paper_id)))?;

        let external = paper.external_ids.as_ref();
        let authors = paper
            .authors
            .iter()
            .filter_map(|a| {
                let name = clean_text(a.name.as_deref()?);
                (!name.is_empty()).then(|| Author::new(name).with_identifier(a.author_id.clone()))
            })
            .collect();

        let publication_date = paper
            .publication_date
            .as_deref()
            .and_then(parse_date)
            .or_else(|| paper.year.and_then(year_start));

        let keywords = paper.fields_of_study.clone().unwrap_or_default();

        Ok(SearchResult::new(paper.paper_id.clone(), title, NAME, access_info(&paper))
            .with_authors(authors)
            .with_abstract(clean_optional(paper.abstract_field.as_deref()))
            .with_publication_date(publication_date)
            .with_journal(paper.journal.as_ref().and_then(|j| clean_optional(j.name.as_deref())))
            .with_venue(clean_optional(paper.venue.as_deref()))
            .with_publisher(Some(resolve_publisher(&paper)))
            .with_doi(external.and_then(|e| e.doi.as_deref()).and_then(clean_doi))
            .with_url(paper.url.clone())
            .with_citation_count(paper.citation_count)
            .with_reference_count(paper.reference_count)
            .with_keywords(keywords.clone())
            .with_subjects(keywords)
            .with_document_type(document_type(paper.publication_types.as_deref()))
            .with_raw_metadata(json!({
                "paper_id": paper.paper_id,
                "publication_types": paper.publication_types,
                "arxiv_id": external.and_then(|e| e.arxiv.clone()),
                "pubmed_id": external.and_then(|e| e.pubmed.clone()),
            })))
    }

    /// Normalize one page; a record that fails becomes a placeholder.
    fn into_results(data: &[Value]) -> Vec<SearchResult> {
        data.iter()
            .enumerate()
            .map(|(idx, raw)| {
                Self::normalize(raw).unwrap_or_else(|err| {
                    warn!(database = NAME, error = %err, "malformed Semantic Scholar record");
                    placeholder(raw, idx)
                })
            })
            .collect()
    }
}

/// Open when flagged open, when an open PDF exists, or when hosted on arXiv.
/// Stand-in for a record that failed normalization, keeping whatever id and
/// title can still be read from it.
fn placeholder(raw: &Value, idx: usize) -> SearchResult {
    let mut result = SearchResult::placeholder(NAME, idx, "Untitled");
    if let Some(id) = raw
        .get("paperId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
    {
        result.id = id.to_string();
    }
    if let Some(title) = clean_optional(raw.get("title").and_then(Value::as_str)) {
        result.title = title;
    }
    result
}

fn access_info(paper: &Paper) -> AccessInfo {
    let pdf_url = paper
        .open_access_pdf
        .as_ref()
        .and_then(|p| p.url.clone())
        .filter(|u| !u.is_empty());
    let on_arxiv = paper
        .url
        .as_deref()
        .is_some_and(|u| u.contains("arxiv.org"))
        || paper
            .external_ids
            .as_ref()
            .is_some_and(|e| e.arxiv.is_some());

    if paper.is_open_access == Some(true) || pdf_url.is_some() || on_arxiv {
        let info = AccessInfo::open_access();
        match pdf_url {
            Some(url) => info.with_pdf_url(url),
            None => info,
        }
    } else {
        AccessInfo::restricted()
    }
}

fn document_type(types: Option<&[String]>) -> &'static str {
    match types.and_then(|t| t.first()).map(String::as_str) {
        Some("JournalArticle") => "journal_article",
        Some("Conference") => "conference_paper",
        Some("Review") => "review",
        Some("Book") => "book",
        Some("BookSection") => "book_chapter",
        _ => "article",
    }
}

/// Venue name, journal name or raw venue; otherwise the index the paper came through.
fn resolve_publisher(paper: &Paper) -> String {
    let named = paper
        .publication_venue
        .as_ref()
        .and_then(|v| clean_optional(v.name.as_deref()))
        .or_else(|| paper.journal.as_ref().and_then(|j| clean_optional(j.name.as_deref())))
        .or_else(|| clean_optional(paper.venue.as_deref()));
    if let Some(name) = named {
        return name;
    }

    let ids = paper.external_ids.as_ref();
    let from_ids = ids.and_then(|e| {
        if e.doi.is_some() {
            Some("CrossRef")
        } else if e.arxiv.is_some() {
            Some("arXiv")
        } else if e.pubmed.is_some() {
            Some("PubMed")
        } else if e.dblp.is_some() {
            Some("DBLP")
        } else if e.acl.is_some() {
            Some("ACL Anthology")
        } else {
            None
        }
    });
    from_ids.unwrap_or("Semantic Scholar").to_string()
}

#[async_trait]
impl DatabaseConnector for SemanticScholarConnector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Semantic Scholar academic graph (cross-discipline papers with citation data)"
    }

    fn health(&self) -> &HealthTracker {
        &self.health
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, ConnectorError> {
        let url = Self::build_search_url(
            &self.base_url,
            &query.query,
            query.max_results,
            query.date_range.as_ref(),
        );
        let page = self.search_page(&url).await?;
        debug!(total = ?page.total, returned = page.data.len(), "Semantic Scholar search");

        Ok(Self::into_results(&page.data))
    }

    async fn probe(&self) -> Result<(), ConnectorError> {
        let url = Self::build_search_url(&self.base_url, "machine learning", 1, None);
        self.search_page(&url).await.map(|_| ())
    }
}
