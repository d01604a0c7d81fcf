//! Optional reranking of retrieved chunks.
//!
//! [`Reranker`] never fails: without a provider, or when the provider errors,
//! documents come back in their original order with their original scores.

mod cohere;

pub use cohere::CohereReranker;

use crate::config::RerankSettings;
use crate::error::RerankError;
use crate::store::SentDocument;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// One reranked position: the index into the submitted documents and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankHit {
    pub index: usize,
    pub relevance_score: f32,
}

#[async_trait]
pub trait RerankProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score `documents` against `query`, returning at most `top_n` hits, best first.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, RerankError>;
}

pub struct Reranker {
    provider: Option<Arc<dyn RerankProvider>>,
    default_top_n: usize,
}

impl Reranker {
    pub fn new(provider: Option<Arc<dyn RerankProvider>>, default_top_n: usize) -> Self {
        Self {
            provider,
            default_top_n,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    /// Cohere when an API key is configured, otherwise disabled.
    pub fn from_settings(settings: &RerankSettings) -> Self {
        let Some(api_key) = settings.api_key.clone().filter(|k| !k.trim().is_empty()) else {
            warn!("COHERE_API_KEY not set, reranking will be skipped");
            return Self::new(None, settings.top_n);
        };
        match CohereReranker::new(&settings.base_url, api_key, &settings.model) {
            Ok(provider) => Self::new(Some(Arc::new(provider)), settings.top_n),
            Err(err) => {
                warn!(error = %err, "failed to build rerank client, reranking disabled");
                Self::new(None, settings.top_n)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    /// Reorder `documents` by provider relevance, keeping at most `top_n`.
    ///
    /// `top_n` falls back to the configured default, then to all documents.
    pub async fn rerank(
        &self,
        query: &str,
        documents: Vec<SentDocument>,
        top_n: Option<usize>,
    ) -> Vec<SentDocument> {
        let Some(provider) = &self.provider else {
            return documents;
        };
        if documents.is_empty() {
            return documents;
        }

        let top_n = match top_n.unwrap_or(self.default_top_n) {
            0 => documents.len(),
            n => n.min(documents.len()),
        };
        let texts: Vec<String> = documents.iter().map(SentDocument::rerank_text).collect();

        let hits = match provider.rerank(query, &texts, top_n).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(provider = provider.name(), error = %err, "rerank failed, keeping original order");
                return documents;
            }
        };

        if let Err(problem) = check_hits(&hits, top_n, documents.len()) {
            warn!(
                provider = provider.name(),
                problem,
                "rerank response unusable, keeping original order"
            );
            return documents;
        }

        let reranked: Vec<SentDocument> = hits
            .iter()
            .map(|hit| {
                let mut doc = documents[hit.index].clone();
                doc.score = hit.relevance_score;
                doc
            })
            .collect();
        info!(count = reranked.len(), "reranked documents");
        reranked
    }
}

/// Hits must name exactly `top_n` distinct in-range documents.
fn check_hits(hits: &[RerankHit], top_n: usize, len: usize) -> Result<(), &'static str> {
    if hits.len() != top_n {
        return Err("wrong number of hits");
    }
    let mut seen = HashSet::with_capacity(hits.len());
    for hit in hits {
        if hit.index >= len {
            return Err("index out of range");
        }
        if !seen.insert(hit.index) {
            return Err("repeated index");
        }
    }
    Ok(())
}
