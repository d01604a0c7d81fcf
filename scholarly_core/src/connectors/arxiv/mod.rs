use crate::config::ArxivSettings;
use crate::connectors::{HealthTracker, USER_AGENT};
use crate::error::ConnectorError;
use crate::federated::normalize::{clean_doi, clean_optional, clean_text, parse_date};
use crate::federated::{AccessInfo, Author, SearchQuery, SearchResult};
use crate::DatabaseConnector;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

const NAME: &str = "arxiv";
const LICENSE: &str = "arXiv.org perpetual, non-exclusive license";
const LICENSE_URL: &str = "https://arxiv.org/licenses/nonexclusive-distrib/1.0/";
const FIELD_PREFIXES: &[&str] = &["ti:", "au:", "abs:", "all:", "cat:", "co:", "jr:", "id:"];

/// One `<entry>` from the arXiv Atom feed, before normalization.
#[derive(Debug, Default, Clone)]
pub struct ArxivEntry {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<Author>,
    pub published: String,
    pub updated: String,
    pub categories: Vec<String>,
    pub primary_category: Option<String>,
    pub links: Vec<ArxivLink>,
    pub doi: Option<String>,
    pub journal_ref: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArxivLink {
    pub href: String,
    pub rel: String,
    pub title: Option<String>,
}

pub struct ArxivConnector {
    client: Client,
    base_url: String,
    health: HealthTracker,
}

impl ArxivConnector {
    pub fn new(settings: &ArxivSettings) -> Result<Self, ConnectorError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            health: HealthTracker::new(NAME),
        })
    }

    /// Translate a query into arXiv's `search_query` syntax, appending the
    /// submission-date window and category filter.
    pub fn build_search_query(query: &SearchQuery) -> String {
        let text = query.query.trim();
        let mut search = if has_field_prefix(text) {
            text.to_string()
        } else {
            format!("all:{}", text)
        };

        if let Some(range) = &query.date_range {
            if let Some(start) = range.start_year {
                search.push_str(&format!(" AND submittedDate:[{}01010000 TO 300012312359]", start));
            }
            if let Some(end) = range.end_year {
                search.push_str(&format!(" AND submittedDate:[190001010000 TO {}12312359]", end));
            }
        }

        let categories = query.filter_values("categories");
        if !categories.is_empty() {
            let clause = categories
                .iter()
                .map(|c| format!("cat:{}", c))
                .collect::<Vec<_>>()
                .join(" OR ");
            search.push_str(&format!(" AND ({})", clause));
        }

        search
    }

    fn build_url(&self, search_query: &str, max_results: u32) -> Result<Url, ConnectorError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ConnectorError::InvalidInput(format!("Failed to parse URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("search_query", search_query)
            .append_pair("start", "0")
            .append_pair("max_results", &max_results.to_string())
            .append_pair("sortBy", "relevance")
            .append_pair("sortOrder", "descending");

        Ok(url)
    }

    async fn fetch(&self, search_query: &str, max_results: u32) -> Result<String, ConnectorError> {
        let url = self.build_url(search_query, max_results)?;
        debug!(%url, "querying arXiv");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::Provider {
                status: status.as_u16(),
                message: "arXiv API returned an error status".to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// Parse an Atom feed into raw entries.
    pub fn parse_arxiv_response(xml_content: &str) -> Result<Vec<ArxivEntry>, ConnectorError> {
        let mut reader = Reader::from_str(xml_content);
        reader.trim_text(true);

        let mut entries = Vec::new();
        let mut current: Option<ArxivEntry> = None;
        let mut current_tag: Option<String> = None;
        let mut buffer = Vec::new();

        loop {
            match reader.read_event_into(&mut buffer) {
                Ok(Event::Start(ref e)) => {
                    let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();

                    match tag_name.as_str() {
                        "entry" => current = Some(ArxivEntry::default()),
                        "author" => {
                            if let Some(entry) = current.as_mut() {
                                entry.authors.push(Author::new(String::new()));
                            }
                        }
                        "id" | "title" | "summary" | "published" | "updated" | "name"
                        | "arxiv:affiliation" | "arxiv:comment" | "arxiv:journal_ref"
                        | "arxiv:doi"
                            if current.is_some() =>
                        {
                            current_tag = Some(tag_name);
                        }
                        _ => {}
                    }
                }
                Ok(Event::Text(ref e)) => {
                    if let (Some(tag), Some(entry)) = (current_tag.as_deref(), current.as_mut()) {
                        let text = e
                            .unescape()
                            .map_err(|err| ConnectorError::ParseError(err.to_string()))?;
                        apply_text(entry, tag, &text);
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    if let Some(entry) = current.as_mut() {
                        apply_empty(entry, e);
                    }
                }
                Ok(Event::End(ref e)) => {
                    let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();

                    if tag_name == "entry" {
                        if let Some(mut entry) = current.take() {
                            entry.authors.retain(|a| !a.name.is_empty());
                            entries.push(entry);
                        }
                    } else if current_tag.as_deref() == Some(tag_name.as_str()) {
                        current_tag = None;
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(ConnectorError::ParseError(e.to_string())),
                _ => {}
            }

            buffer.clear();
        }

        Ok(entries)
    }

    /// Map a raw entry onto a [`SearchResult`]. arXiv content is open access.
    pub fn normalize(entry: &ArxivEntry) -> Result<SearchResult, String> {
        let id = entry
            .id
            .trim()
            .trim_start_matches("http://arxiv.org/abs/")
            .trim_start_matches("https://arxiv.org/abs/")
            .to_string();
        if id.is_empty() {
            return Err("entry has no id".to_string());
        }
        let title = clean_text(&entry.title);
        if title.is_empty() {
            return Err(format!("entry {} has no title", id));
        }

        let pdf_url = entry
            .links
            .iter()
            .find(|l| l.title.as_deref() == Some("pdf"))
            .map(|l| l.href.clone())
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{}", id));
        let abs_url = entry
            .links
            .iter()
            .find(|l| l.rel == "alternate")
            .map(|l| l.href.clone())
            .unwrap_or_else(|| format!("https://arxiv.org/abs/{}", id));

        let access = AccessInfo::open_access()
            .with_license(LICENSE, Some(LICENSE_URL.to_string()))
            .with_pdf_url(pdf_url)
            .with_repository_url("https://arxiv.org");

        let authors = entry
            .authors
            .iter()
            .map(|a| {
                Author::new(clean_text(&a.name))
                    .with_affiliation(clean_optional(a.affiliation.as_deref()))
            })
            .collect();

        Ok(SearchResult::new(id.clone(), title, NAME, access)
            .with_authors(authors)
            .with_abstract(clean_optional(Some(&entry.summary)))
            .with_publication_date(parse_date(&entry.published))
            .with_journal(clean_optional(entry.journal_ref.as_deref()))
            .with_venue(Some("arXiv".to_string()))
            .with_publisher(Some("arXiv".to_string()))
            .with_doi(entry.doi.as_deref().and_then(clean_doi))
            .with_url(Some(abs_url))
            .with_subjects(entry.categories.clone())
            .with_document_type("preprint")
            .with_raw_metadata(json!({
                "arxiv_id": id,
                "primary_category": entry.primary_category,
                "updated": entry.updated,
                "comment": entry.comment,
                "journal_ref": entry.journal_ref,
            })))
    }

    /// Normalize a whole feed; an entry that fails becomes a placeholder.
    fn into_results(entries: &[ArxivEntry]) -> Vec<SearchResult> {
        entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                Self::normalize(entry).unwrap_or_else(|reason| {
                    warn!(database = NAME, %reason, "malformed arXiv entry");
                    SearchResult::placeholder(NAME, idx, "Unknown Title")
                })
            })
            .collect()
    }
}

fn apply_text(entry: &mut ArxivEntry, tag: &str, text: &str) {
    match tag {
        "id" => entry.id.push_str(text),
        "title" => append_spaced(&mut entry.title, text),
        "summary" => append_spaced(&mut entry.summary, text),
        "published" => entry.published.push_str(text),
        "updated" => entry.updated.push_str(text),
        "name" => {
            if let Some(author) = entry.authors.last_mut() {
                append_spaced(&mut author.name, text);
            }
        }
        "arxiv:affiliation" => {
            if let Some(author) = entry.authors.last_mut() {
                author.affiliation = Some(text.to_string());
            }
        }
        "arxiv:comment" => entry.comment = Some(text.to_string()),
        "arxiv:journal_ref" => entry.journal_ref = Some(text.to_string()),
        "arxiv:doi" => entry.doi = Some(text.to_string()),
        _ => {}
    }
}

fn apply_empty(entry: &mut ArxivEntry, e: &BytesStart<'_>) {
    let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let attr = |wanted: &str| {
        e.attributes()
            .filter_map(Result::ok)
            .find(|a| a.key.as_ref() == wanted.as_bytes())
            .map(|a| String::from_utf8_lossy(&a.value).to_string())
    };

    match tag_name.as_str() {
        "link" => entry.links.push(ArxivLink {
            href: attr("href").unwrap_or_default(),
            rel: attr("rel").unwrap_or_default(),
            title: attr("title"),
        }),
        "category" => {
            if let Some(term) = attr("term") {
                entry.categories.push(term);
            }
        }
        "arxiv:primary_category" => entry.primary_category = attr("term"),
        _ => {}
    }
}

/// Whether some word of `text` opens with an arXiv field prefix such as `ti:`.
fn has_field_prefix(text: &str) -> bool {
    text.split_whitespace()
        .map(|word| word.trim_start_matches(['(', '"']))
        .any(|word| FIELD_PREFIXES.iter().any(|p| word.starts_with(p)))
}

fn append_spaced(target: &mut String, text: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

#[async_trait]
impl DatabaseConnector for ArxivConnector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "arXiv preprint repository (physics, mathematics, computer science and more)"
    }

    fn health(&self) -> &HealthTracker {
        &self.health
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, ConnectorError> {
        let search_query = Self::build_search_query(query);
        let body = self.fetch(&search_query, query.max_results).await?;
        let entries = Self::parse_arxiv_response(&body)?;
        Ok(Self::into_results(&entries))
    }

    async fn probe(&self) -> Result<(), ConnectorError> {
        let body = self.fetch("all:machine learning", 1).await?;
        Self::parse_arxiv_response(&body).map(|_| ())
    }
}
