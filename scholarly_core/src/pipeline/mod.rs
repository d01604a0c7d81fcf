//! Research pipeline: search, index, retrieve, rerank and stream an answer.
//!
//! A run is a sequence of stages driven inside one spawned task. Progress goes
//! out over a bounded channel as [`PipelineEvent`]s; every run ends with
//! exactly one `Complete` event, including runs that fail or panic.

mod events;
mod request;

pub use events::{Outcome, PipelineEvent, Stage, SSE_DONE};
pub use request::ResearchRequest;

use crate::config::Settings;
use crate::error::PipelineError;
use crate::federated::dedup::{remove_duplicates, DedupOutcome};
use crate::federated::{FederatedSearch, SearchQuery, SearchResult, MAX_RESULTS_LIMIT};
use crate::llm::{self, ChatMessage, DatabaseQuery, LanguageModel, TokenStream};
use crate::rerank::Reranker;
use crate::store::DocumentStore;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Reply used when retrieval finds nothing to answer from.
pub const NO_DOCUMENTS_MESSAGE: &str = "I couldn't find relevant academic documents to answer \
your question. Please try rephrasing your query or being more specific about the research area.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Chunks retrieved for answering when the request gives no `top_k`
    pub top_k: usize,
    /// Per-provider results requested for each generated query
    pub database_candidates: u32,
    pub max_database_queries: usize,
    pub channel_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: 20,
            database_candidates: 50,
            max_database_queries: 5,
            channel_capacity: 32,
        }
    }
}

type StageResult<T> = Result<T, (Stage, PipelineError)>;

fn at<E: Into<PipelineError>>(stage: Stage) -> impl FnOnce(E) -> (Stage, PipelineError) {
    move |err| (stage, err.into())
}

/// Sends events for one run and remembers when the receiver has gone away.
struct Emitter<'a> {
    tx: &'a mpsc::Sender<PipelineEvent>,
    stream_events: bool,
    connected: bool,
}

impl Emitter<'_> {
    async fn emit(&mut self, event: PipelineEvent) -> bool {
        if self.connected && self.tx.send(event).await.is_err() {
            debug!("event receiver dropped, stopping emission");
            self.connected = false;
        }
        self.connected
    }

    async fn status(&mut self, stage: Stage, message: impl Into<String>) {
        if self.stream_events {
            self.emit(PipelineEvent::status(stage, message)).await;
        }
    }

    /// Events only sent when the caller asked for internal progress.
    async fn detail(&mut self, event: PipelineEvent) {
        if self.stream_events {
            self.emit(event).await;
        }
    }
}

#[derive(Clone)]
pub struct ResearchPipeline {
    search: Arc<FederatedSearch>,
    store: Arc<DocumentStore>,
    reranker: Arc<Reranker>,
    llm: Arc<dyn LanguageModel>,
    settings: PipelineSettings,
}

impl ResearchPipeline {
    pub fn new(
        search: Arc<FederatedSearch>,
        store: Arc<DocumentStore>,
        reranker: Arc<Reranker>,
        llm: Arc<dyn LanguageModel>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            search,
            store,
            reranker,
            llm,
            settings,
        }
    }

    /// Wire every collaborator from configuration.
    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        let registry = crate::build_registry_enabled_only(settings);
        let search = FederatedSearch::from_settings(Arc::new(registry), &settings.search);
        let store = DocumentStore::from_settings(settings)?;
        let reranker = Reranker::from_settings(&settings.rerank);
        let llm = llm::from_settings(&settings.llm)?;
        Ok(Self::new(
            Arc::new(search),
            Arc::new(store),
            Arc::new(reranker),
            llm,
            settings.pipeline.clone(),
        ))
    }

    /// Start a run on the tokio runtime and return its event stream.
    ///
    /// A panic inside the run is reported as an `Error` event followed by
    /// `Complete`.
    pub fn run(&self, request: ResearchRequest) -> mpsc::Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let pipeline = self.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let worker_tx = tx.clone();
            let worker = tokio::spawn(async move { pipeline.execute(request, &worker_tx).await });

            if let Err(err) = worker.await {
                error!(error = %err, "pipeline worker aborted");
                let _ = tx
                    .send(PipelineEvent::Error {
                        message: "Internal error while processing the request".to_string(),
                        stage: None,
                    })
                    .await;
                let _ = tx
                    .send(PipelineEvent::Complete {
                        processing_time_ms: started.elapsed().as_millis() as u64,
                        total_documents: 0,
                        outcome: Outcome::Errored,
                    })
                    .await;
            }
        });

        rx
    }

    /// Drive one run to completion, sending events on `tx`.
    pub async fn execute(&self, request: ResearchRequest, tx: &mpsc::Sender<PipelineEvent>) {
        let started = Instant::now();
        let mut out = Emitter {
            tx,
            stream_events: request.stream_events,
            connected: true,
        };

        let (total_documents, outcome) = match self.drive(&request, &mut out).await {
            Ok(total) => (total, Outcome::Stopped),
            Err((stage, err)) => {
                error!(stage = ?stage, error = %err, "pipeline stage failed");
                out.emit(PipelineEvent::Error {
                    message: err.to_string(),
                    stage: Some(stage),
                })
                .await;
                (0, Outcome::Errored)
            }
        };

        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            processing_time_ms,
            total_documents,
            outcome = ?outcome,
            "pipeline run finished"
        );
        out.emit(PipelineEvent::Complete {
            processing_time_ms,
            total_documents,
            outcome,
        })
        .await;
    }

    async fn drive(&self, request: &ResearchRequest, out: &mut Emitter<'_>) -> StageResult<usize> {
        request.validate().map_err(at(Stage::Validation))?;
        let conversation = request.conversation();

        if request.clarify_first_turn && request.is_first_turn() {
            out.status(Stage::Clarification, "Analyzing query for clarifications...")
                .await;
            let tokens = self
                .llm
                .clarification_stream(&conversation)
                .await
                .map_err(at(Stage::Clarification))?;
            forward_tokens(tokens, out, Stage::Clarification).await?;
            return Ok(0);
        }

        out.status(Stage::QueryGeneration, "Generating search queries...")
            .await;
        let queries = self.generate_queries(&conversation, &request.query).await;
        out.detail(PipelineEvent::Queries {
            queries: queries.clone(),
        })
        .await;
        if !out.connected {
            return Ok(0);
        }

        let candidates = self.search_all(&queries, request, out).await;

        out.status(Stage::Deduplicating, "Removing duplicate documents...")
            .await;
        let DedupOutcome {
            unique,
            duplicates_removed,
        } = remove_duplicates(candidates);
        debug!(unique = unique.len(), duplicates_removed, "deduplicated candidates");
        out.status(
            Stage::Deduplicating,
            format!("Found {} unique documents", unique.len()),
        )
        .await;
        if !out.connected {
            return Ok(0);
        }

        out.status(Stage::Embedding, "Processing and embedding documents...")
            .await;
        if unique.is_empty() {
            warn!("no documents to embed");
        } else {
            self.store
                .process_and_store(&unique)
                .await
                .map_err(at(Stage::Embedding))?;
        }
        if !out.connected {
            return Ok(0);
        }

        out.status(Stage::Retrieving, "Finding most relevant documents...")
            .await;
        let top_k = request.top_k.unwrap_or(self.settings.top_k);
        let mut documents = self
            .store
            .similarity_search(&request.query, top_k, request.access_filter)
            .await
            .map_err(at(Stage::Retrieving))?;

        if self.reranker.is_available() && !documents.is_empty() {
            out.status(Stage::Reranking, "Reranking documents...").await;
            documents = self.reranker.rerank(&request.query, documents, None).await;
        }
        out.detail(PipelineEvent::Documents {
            documents: documents.clone(),
        })
        .await;

        out.status(Stage::Generating, "Generating response...").await;
        if documents.is_empty() {
            warn!("no documents retrieved, sending fallback message");
            out.emit(PipelineEvent::chunk(NO_DOCUMENTS_MESSAGE)).await;
            return Ok(0);
        }

        let tokens = self
            .llm
            .answer_stream(&conversation, &documents)
            .await
            .map_err(at(Stage::Generating))?;
        forward_tokens(tokens, out, Stage::Generating).await?;
        Ok(documents.len())
    }

    /// Model-generated queries, or the raw question when generation fails.
    async fn generate_queries(
        &self,
        conversation: &[ChatMessage],
        query: &str,
    ) -> Vec<DatabaseQuery> {
        let max = self.settings.max_database_queries.max(1);
        match self.llm.generate_queries(conversation, max).await {
            Ok(mut queries) if !queries.is_empty() => {
                queries.truncate(max);
                queries
            }
            Ok(_) => {
                warn!("model returned no queries, using the original question");
                fallback_queries(query)
            }
            Err(err) => {
                warn!(error = %err, "query generation failed, using the original question");
                fallback_queries(query)
            }
        }
    }

    async fn search_all(
        &self,
        queries: &[DatabaseQuery],
        request: &ResearchRequest,
        out: &mut Emitter<'_>,
    ) -> Vec<SearchResult> {
        let max_results = request
            .max_results
            .unwrap_or(self.settings.database_candidates)
            .min(MAX_RESULTS_LIMIT);
        out.status(Stage::Searching, "Searching academic databases...")
            .await;

        let mut candidates = Vec::new();
        for (i, generated) in queries.iter().enumerate() {
            out.status(
                Stage::Searching,
                format!(
                    "Searching with query {}/{}: {}",
                    i + 1,
                    queries.len(),
                    generated.focus
                ),
            )
            .await;

            let mut query = SearchQuery::new(generated.query.clone()).with_max_results(max_results);
            if let Some(databases) = &request.databases {
                query = query.with_databases(databases.iter().cloned());
            }
            let response = self.search.search(&query).await;
            if response.all_failed() {
                warn!(query = %generated.query, "every provider failed for generated query");
            }
            info!(
                query = %generated.query,
                found = response.results.len(),
                "generated query searched"
            );
            candidates.extend(response.results);
        }
        candidates
    }
}

fn fallback_queries(query: &str) -> Vec<DatabaseQuery> {
    vec![DatabaseQuery {
        query: query.to_string(),
        focus: "Original query".to_string(),
    }]
}

async fn forward_tokens(
    mut tokens: TokenStream,
    out: &mut Emitter<'_>,
    stage: Stage,
) -> StageResult<()> {
    while let Some(item) = tokens.next().await {
        let token = item.map_err(at(stage))?;
        if !out.emit(PipelineEvent::chunk(token)).await {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.top_k, 20);
        assert_eq!(settings.database_candidates, 50);
        assert_eq!(settings.channel_capacity, 32);
    }

    #[test]
    fn fallback_uses_original_question() {
        let queries = fallback_queries("What is RAG?");
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].focus, "Original query");
    }

    #[tokio::test]
    async fn emitter_stops_after_disconnect() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut out = Emitter {
            tx: &tx,
            stream_events: true,
            connected: true,
        };
        assert!(!out.emit(PipelineEvent::chunk("x")).await);
        assert!(!out.connected);
    }
}
