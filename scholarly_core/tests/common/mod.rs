#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::stream::{self, StreamExt};
use scholarly_core::connectors::HealthTracker;
use scholarly_core::embedding::{Embedder, HashingEmbedder};
use scholarly_core::error::{ConnectorError, LlmError, RerankError, StoreError};
use scholarly_core::federated::{AccessInfo, SearchQuery, SearchResult};
use scholarly_core::llm::{ChatMessage, DatabaseQuery, LanguageModel, TokenStream};
use scholarly_core::rerank::{RerankHit, RerankProvider};
use scholarly_core::store::SentDocument;
use scholarly_core::vector::{MetadataFilter, VectorHit, VectorPoint, VectorStore};
use scholarly_core::{ConnectorRegistry, DatabaseConnector};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn paper(id: &str, title: &str, year: i32, open: bool) -> SearchResult {
    let access = if open {
        AccessInfo::open_access()
    } else {
        AccessInfo::restricted()
    };
    SearchResult::new(id, title, "fake", access)
        .with_abstract(Some(format!("An abstract about {}.", title.to_lowercase())))
        .with_publication_date(Some(Utc.with_ymd_and_hms(year, 1, 15, 0, 0, 0).unwrap()))
}

// ============================================================================
// Connectors
// ============================================================================

pub struct FakeConnector {
    name: &'static str,
    results: Vec<SearchResult>,
    delay: Duration,
    fail: bool,
    health: HealthTracker,
    seen_queries: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new(name: &'static str, results: Vec<SearchResult>) -> Self {
        Self {
            name,
            results,
            delay: Duration::ZERO,
            fail: false,
            health: HealthTracker::new(name),
            seen_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn seen_queries(&self) -> Vec<String> {
        self.seen_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatabaseConnector for FakeConnector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "in-process test connector"
    }

    fn health(&self) -> &HealthTracker {
        &self.health
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, ConnectorError> {
        self.seen_queries.lock().unwrap().push(query.query.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(ConnectorError::Provider {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(self
            .results
            .iter()
            .take(query.max_results as usize)
            .cloned()
            .collect())
    }

    async fn probe(&self) -> Result<(), ConnectorError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            Err(ConnectorError::Other("probe failed".into()))
        } else {
            Ok(())
        }
    }
}

pub fn registry(connectors: Vec<Arc<FakeConnector>>) -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();
    for connector in connectors {
        registry.register_provider(connector);
    }
    registry
}

// ============================================================================
// Store collaborators
// ============================================================================

pub fn hashing_embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::new(128))
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, StoreError> {
        Err(StoreError::Embedding("quota exceeded".into()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    Upsert,
    Query,
    HashLookup,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Collection gone or unusable; the store may recreate it.
    MissingCollection,
    /// Backend outage; stored documents must survive it.
    Outage,
}

impl Fault {
    fn error(self) -> StoreError {
        match self {
            Fault::MissingCollection => StoreError::CollectionMissing("papers".into()),
            Fault::Outage => StoreError::Unavailable("qdrant returned 503".into()),
        }
    }
}

/// Wraps a store and fails the first `failures` calls of one operation.
pub struct FlakyVectorStore<S> {
    inner: S,
    pub failures: AtomicUsize,
    op: FaultOp,
    fault: Fault,
    pub deletes: AtomicUsize,
}

impl<S> FlakyVectorStore<S> {
    /// Upserts fail with a missing collection.
    pub fn new(inner: S, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            op: FaultOp::Upsert,
            fault: Fault::MissingCollection,
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, op: FaultOp, fault: Fault) -> Self {
        self.op = op;
        self.fault = fault;
        self
    }

    fn trip(&self, op: FaultOp) -> Result<(), StoreError> {
        if op != self.op {
            return Ok(());
        }
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(self.fault.error());
        }
        Ok(())
    }
}

#[async_trait]
impl<S: VectorStore> VectorStore for FlakyVectorStore<S> {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<(), StoreError> {
        self.inner.ensure_collection(dimensions).await
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), StoreError> {
        self.trip(FaultOp::Upsert)?;
        self.inner.upsert(points).await
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>, StoreError> {
        self.trip(FaultOp::Query)?;
        self.inner.query(vector, k, filter).await
    }

    async fn metadata_values(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        self.trip(FaultOp::HashLookup)?;
        self.inner.metadata_values(key).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_collection().await
    }
}

// ============================================================================
// Reranking
// ============================================================================

/// Ranks documents in reverse of the order they were submitted.
pub struct ReversingReranker;

#[async_trait]
impl RerankProvider for ReversingReranker {
    fn name(&self) -> &'static str {
        "reversing"
    }

    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, RerankError> {
        Ok((0..documents.len())
            .rev()
            .take(top_n)
            .enumerate()
            .map(|(rank, index)| RerankHit {
                index,
                relevance_score: 1.0 - rank as f32 * 0.1,
            })
            .collect())
    }
}

// ============================================================================
// Language model
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum AnswerMode {
    Tokens,
    Fail,
    Panic,
}

/// Language model with canned replies.
pub struct ScriptedModel {
    pub queries: Option<Vec<DatabaseQuery>>,
    pub clarification: Vec<String>,
    pub answer: Vec<String>,
    pub answer_mode: AnswerMode,
    pub answered_with: Mutex<Option<usize>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            queries: Some(vec![
                DatabaseQuery {
                    query: "retrieval augmented generation".into(),
                    focus: "methods".into(),
                },
                DatabaseQuery {
                    query: "rag evaluation".into(),
                    focus: "evaluation".into(),
                },
            ]),
            clarification: vec!["Which ".into(), "aspect?".into()],
            answer: vec!["RAG ".into(), "combines ".into(), "retrieval.".into()],
            answer_mode: AnswerMode::Tokens,
            answered_with: Mutex::new(None),
        }
    }

    pub fn without_queries(mut self) -> Self {
        self.queries = None;
        self
    }

    pub fn answering(mut self, mode: AnswerMode) -> Self {
        self.answer_mode = mode;
        self
    }
}

fn tokens(parts: &[String]) -> TokenStream {
    stream::iter(parts.to_vec().into_iter().map(Ok)).boxed()
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate_queries(
        &self,
        _conversation: &[ChatMessage],
        max: usize,
    ) -> Result<Vec<DatabaseQuery>, LlmError> {
        match &self.queries {
            Some(queries) => Ok(queries.iter().take(max).cloned().collect()),
            None => Err(LlmError::InvalidResponse("no json".into())),
        }
    }

    async fn clarification_stream(
        &self,
        _conversation: &[ChatMessage],
    ) -> Result<TokenStream, LlmError> {
        Ok(tokens(&self.clarification))
    }

    async fn answer_stream(
        &self,
        _conversation: &[ChatMessage],
        documents: &[SentDocument],
    ) -> Result<TokenStream, LlmError> {
        *self.answered_with.lock().unwrap() = Some(documents.len());
        match self.answer_mode {
            AnswerMode::Tokens => Ok(tokens(&self.answer)),
            AnswerMode::Fail => Err(LlmError::Provider {
                status: 500,
                message: "model overloaded".into(),
            }),
            AnswerMode::Panic => panic!("scripted model panic"),
        }
    }
}
