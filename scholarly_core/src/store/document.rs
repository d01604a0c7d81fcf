//! What gets embedded for each search result, and what comes back out.

use crate::federated::{AccessType, SearchResult};
use crate::vector::VectorHit;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub const CONTENT_KEY: &str = "content";
pub const DOC_HASH_KEY: &str = "doc_hash";
pub const ACCESS_KEY: &str = "access";

const UNKNOWN: &str = "Unknown";
const UNKNOWN_AUTHORS: &str = "Unknown Authors";
const NO_ABSTRACT: &str = "No abstract available";
const ABSTRACT_PREVIEW_CHARS: usize = 200;

/// Text embedded for a result.
pub fn render_content(title: &str, abstract_text: Option<&str>) -> String {
    format!(
        "Title: {}\n\nAbstract: {}",
        title,
        abstract_text.unwrap_or(NO_ABSTRACT)
    )
}

/// Content hash used to skip documents that are already indexed.
pub fn doc_hash(title: &str, abstract_text: &str) -> String {
    let digest = Sha256::digest(format!("{}_{}", title, abstract_text).as_bytes());
    digest
        .iter()
        .take(6)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Flat metadata stored with every chunk of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedDocumentMetadata {
    pub title: String,
    pub authors: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub year: String,
    pub month: String,
    /// Publisher, falling back to the provider name
    pub source: String,
    pub url: String,
    pub doc_hash: String,
    #[serde(rename = "type")]
    pub document_type: String,
    pub access: AccessType,
}

impl EmbeddedDocumentMetadata {
    pub fn from_result(result: &SearchResult) -> Self {
        let abstract_text = result.abstract_text.clone().unwrap_or_default();
        let authors = if result.authors.is_empty() {
            UNKNOWN_AUTHORS.to_string()
        } else {
            result
                .authors
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let (year, month) = match result.publication_date {
            Some(date) => (date.year().to_string(), format!("{:02}", date.month())),
            None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
        };

        Self {
            doc_hash: doc_hash(&result.title, &abstract_text),
            title: result.title.clone(),
            authors,
            abstract_text,
            year,
            month,
            source: result
                .publisher
                .clone()
                .unwrap_or_else(|| result.source_database.clone()),
            url: result.url.clone().unwrap_or_default(),
            document_type: "academic_paper".to_string(),
            access: result.access(),
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// A retrieved chunk as handed to the reranker and the answer generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentDocument {
    pub content: String,
    /// Similarity, replaced by the rerank relevance when reranked
    pub score: f32,
    pub title: String,
    pub authors: String,
    pub year: String,
    pub source: String,
    pub url: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub access: AccessType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_hash: Option<String>,
}

impl SentDocument {
    pub fn from_hit(hit: VectorHit) -> Self {
        let meta = &hit.metadata;
        let text = |key: &str, fallback: &str| {
            meta.get(key)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string()
        };
        let content = text(CONTENT_KEY, "");

        Self {
            abstract_text: extract_abstract(&content),
            title: text("title", "Unknown Title"),
            authors: text("authors", UNKNOWN_AUTHORS),
            year: text("year", UNKNOWN),
            source: text("source", UNKNOWN),
            url: text("url", ""),
            access: meta
                .get(ACCESS_KEY)
                .and_then(Value::as_str)
                .and_then(|a| a.parse().ok())
                .unwrap_or(AccessType::Restricted),
            doc_hash: meta
                .get(DOC_HASH_KEY)
                .and_then(Value::as_str)
                .map(str::to_string),
            score: hit.score,
            content,
        }
    }

    /// Text sent to the reranker.
    pub fn rerank_text(&self) -> String {
        if self.abstract_text.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n{}", self.title, self.abstract_text)
        }
    }
}

/// The `Abstract:` paragraph of a chunk, else a short preview.
pub fn extract_abstract(content: &str) -> String {
    let mut lines = Vec::new();
    let mut found = false;

    for line in content.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("Abstract:") {
            found = true;
            let rest = rest.trim();
            if !rest.is_empty() {
                lines.push(rest);
            }
        } else if found && !line.is_empty() {
            lines.push(line);
        } else if found {
            break;
        }
    }

    if lines.is_empty() {
        let preview: String = content.chars().take(ABSTRACT_PREVIEW_CHARS).collect();
        format!("{}...", preview)
    } else {
        lines.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federated::{AccessInfo, Author};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn hash_is_twelve_hex_chars_and_stable() {
        let a = doc_hash("Title", "Abstract");
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, doc_hash("Title", "Abstract"));
        assert_ne!(a, doc_hash("Title", "Other"));
    }

    #[test]
    fn metadata_from_result() {
        let result = SearchResult::new("1", "Deep Learning", "arxiv", AccessInfo::open_access())
            .with_authors(vec![Author::new("A. One"), Author::new("B. Two")])
            .with_abstract(Some("We study things.".into()))
            .with_publication_date(Some(Utc.with_ymd_and_hms(2021, 3, 9, 0, 0, 0).unwrap()));
        let meta = EmbeddedDocumentMetadata::from_result(&result);
        assert_eq!(meta.authors, "A. One, B. Two");
        assert_eq!(meta.year, "2021");
        assert_eq!(meta.month, "03");
        assert_eq!(meta.source, "arxiv");
        assert_eq!(meta.access, AccessType::Open);

        let map = meta.to_map();
        assert_eq!(map["type"], "academic_paper");
        assert_eq!(map["access"], "open");
        assert_eq!(map["abstract"], "We study things.");
    }

    #[test]
    fn missing_fields_use_placeholders() {
        let result = SearchResult::new("2", "Untitled work", "searxng", AccessInfo::restricted());
        let meta = EmbeddedDocumentMetadata::from_result(&result);
        assert_eq!(meta.authors, "Unknown Authors");
        assert_eq!(meta.year, "Unknown");
        assert_eq!(
            render_content(&result.title, result.abstract_text.as_deref()),
            "Title: Untitled work\n\nAbstract: No abstract available"
        );
    }

    #[test]
    fn abstract_is_recovered_from_content() {
        let content = "Title: X\n\nAbstract: first line\ncontinued here\n\ntrailing";
        assert_eq!(extract_abstract(content), "first line continued here");
        let fragment = "a chunk from the middle of a long abstract";
        assert_eq!(extract_abstract(fragment), format!("{}...", fragment));
    }

    #[test]
    fn sent_document_from_hit() {
        let hit = VectorHit {
            id: "p1".into(),
            score: 0.8,
            metadata: json!({
                "content": "Title: T\n\nAbstract: body",
                "title": "T",
                "access": "open",
                "doc_hash": "abc123abc123"
            })
            .as_object()
            .cloned()
            .unwrap(),
        };
        let doc = SentDocument::from_hit(hit);
        assert_eq!(doc.abstract_text, "body");
        assert_eq!(doc.access, AccessType::Open);
        assert_eq!(doc.authors, "Unknown Authors");
        assert_eq!(doc.rerank_text(), "T\nbody");
    }
}
