mod common;

use common::{
    hashing_embedder, paper, registry, AnswerMode, FakeConnector, ReversingReranker, ScriptedModel,
};
use scholarly_core::federated::FederatedSearch;
use scholarly_core::llm::ChatMessage;
use scholarly_core::pipeline::{
    Outcome, PipelineEvent, PipelineSettings, ResearchPipeline, ResearchRequest, Stage,
    NO_DOCUMENTS_MESSAGE, SSE_DONE,
};
use scholarly_core::rerank::Reranker;
use scholarly_core::store::{ChunkingConfig, DocumentStore};
use scholarly_core::vector::InMemoryVectorStore;
use std::sync::Arc;

fn build(connector: Arc<FakeConnector>, model: Arc<ScriptedModel>) -> ResearchPipeline {
    build_with(connector, model, Reranker::disabled())
}

fn build_with(
    connector: Arc<FakeConnector>,
    model: Arc<ScriptedModel>,
    reranker: Reranker,
) -> ResearchPipeline {
    let search = FederatedSearch::new(Arc::new(registry(vec![connector])))
        .with_default_databases(vec!["fake".to_string()]);
    let store = DocumentStore::new(
        hashing_embedder(),
        Arc::new(InMemoryVectorStore::new()),
        ChunkingConfig::default(),
    );
    ResearchPipeline::new(
        Arc::new(search),
        Arc::new(store),
        Arc::new(reranker),
        model,
        PipelineSettings::default(),
    )
}

fn corpus() -> Arc<FakeConnector> {
    Arc::new(FakeConnector::new(
        "fake",
        vec![
            paper("p1", "Retrieval augmented generation for QA", 2023, true),
            paper("p2", "Evaluating retrieval augmented systems", 2024, false),
            paper("p3", "Dense passage retrieval", 2020, true),
        ],
    ))
}

fn follow_up(query: &str) -> ResearchRequest {
    ResearchRequest::new(query).with_history(vec![
        ChatMessage::user("Tell me about RAG"),
        ChatMessage::assistant("Which aspect interests you?"),
    ])
}

async fn collect(pipeline: &ResearchPipeline, request: ResearchRequest) -> Vec<PipelineEvent> {
    let mut rx = pipeline.run(request);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn chunks(events: &[PipelineEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::ResponseChunk { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

fn assert_single_terminal(events: &[PipelineEvent]) {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1);
    assert!(events.last().is_some_and(PipelineEvent::is_terminal));
}

#[tokio::test]
async fn test_first_turn_streams_clarification_only() {
    let connector = corpus();
    let pipeline = build(Arc::clone(&connector), Arc::new(ScriptedModel::new()));

    let events = collect(&pipeline, ResearchRequest::new("Tell me about RAG")).await;

    assert_eq!(chunks(&events), vec!["Which ", "aspect?"]);
    assert!(!events.iter().any(|e| matches!(
        e,
        PipelineEvent::Documents { .. } | PipelineEvent::Queries { .. }
    )));
    assert!(connector.seen_queries().is_empty());
    assert_single_terminal(&events);
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Complete {
            outcome: Outcome::Stopped,
            total_documents: 0,
            ..
        })
    ));
}

#[tokio::test]
async fn test_no_documents_sends_fallback_message() {
    let empty = Arc::new(FakeConnector::new("fake", vec![]));
    let model = Arc::new(ScriptedModel::new());
    let pipeline = build(empty, Arc::clone(&model));

    let events = collect(&pipeline, follow_up("Methods for evaluation")).await;

    assert_eq!(chunks(&events), vec![NO_DOCUMENTS_MESSAGE]);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Error { .. })));
    assert_single_terminal(&events);
    assert!(model.answered_with.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_follow_up_runs_full_pipeline_with_events() {
    let connector = corpus();
    let model = Arc::new(ScriptedModel::new());
    let pipeline = build(Arc::clone(&connector), Arc::clone(&model));

    let events = collect(
        &pipeline,
        follow_up("Evaluation methods for RAG").with_stream_events(true),
    )
    .await;

    assert_eq!(
        connector.seen_queries(),
        vec!["retrieval augmented generation", "rag evaluation"]
    );

    let queries = events.iter().find_map(|e| match e {
        PipelineEvent::Queries { queries } => Some(queries),
        _ => None,
    });
    assert_eq!(queries.map(Vec::len), Some(2));

    let documents = events
        .iter()
        .find_map(|e| match e {
            PipelineEvent::Documents { documents } => Some(documents),
            _ => None,
        })
        .expect("documents event");
    assert_eq!(documents.len(), 3);
    assert_eq!(*model.answered_with.lock().unwrap(), Some(3));

    let stages: Vec<Stage> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Status { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    for expected in [
        Stage::QueryGeneration,
        Stage::Searching,
        Stage::Deduplicating,
        Stage::Embedding,
        Stage::Retrieving,
        Stage::Generating,
    ] {
        assert!(stages.contains(&expected), "missing {:?}", expected);
    }
    assert!(!stages.contains(&Stage::Reranking));

    assert_eq!(chunks(&events), vec!["RAG ", "combines ", "retrieval."]);
    assert_single_terminal(&events);
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Complete {
            outcome: Outcome::Stopped,
            total_documents: 3,
            ..
        })
    ));
}

#[tokio::test]
async fn test_reranker_reorders_documents_and_limits_top_n() {
    let reranker = Reranker::new(Some(Arc::new(ReversingReranker)), 2);
    let model = Arc::new(ScriptedModel::new());
    let pipeline = build_with(corpus(), Arc::clone(&model), reranker);

    let events = collect(
        &pipeline,
        follow_up("Evaluation methods for RAG").with_stream_events(true),
    )
    .await;

    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::Status {
            stage: Stage::Reranking,
            ..
        }
    )));
    let documents = events
        .iter()
        .find_map(|e| match e {
            PipelineEvent::Documents { documents } => Some(documents),
            _ => None,
        })
        .expect("documents event");
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].score, 1.0);
    assert!(documents[0].score > documents[1].score);
    assert_eq!(*model.answered_with.lock().unwrap(), Some(2));
}

#[tokio::test]
async fn test_internal_events_hidden_by_default() {
    let pipeline = build(corpus(), Arc::new(ScriptedModel::new()));

    let events = collect(&pipeline, follow_up("Evaluation methods for RAG")).await;

    assert!(events.iter().all(|e| matches!(
        e,
        PipelineEvent::ResponseChunk { .. } | PipelineEvent::Complete { .. }
    )));
    assert_eq!(chunks(&events).len(), 3);
}

#[tokio::test]
async fn test_query_generation_failure_falls_back_to_question() {
    let connector = corpus();
    let model = Arc::new(ScriptedModel::new().without_queries());
    let pipeline = build(Arc::clone(&connector), model);

    let events = collect(&pipeline, follow_up("Dense retrieval tradeoffs")).await;

    assert_eq!(connector.seen_queries(), vec!["Dense retrieval tradeoffs"]);
    assert!(!chunks(&events).is_empty());
    assert_single_terminal(&events);
}

#[tokio::test]
async fn test_generation_error_is_reported_then_completed() {
    let model = Arc::new(ScriptedModel::new().answering(AnswerMode::Fail));
    let pipeline = build(corpus(), model);

    let events = collect(&pipeline, follow_up("Evaluation methods for RAG")).await;

    let n = events.len();
    assert!(n >= 2);
    assert!(matches!(
        &events[n - 2],
        PipelineEvent::Error {
            stage: Some(Stage::Generating),
            ..
        }
    ));
    assert!(matches!(
        &events[n - 1],
        PipelineEvent::Complete {
            outcome: Outcome::Errored,
            ..
        }
    ));
}

#[tokio::test]
async fn test_panic_still_completes_stream() {
    let model = Arc::new(ScriptedModel::new().answering(AnswerMode::Panic));
    let pipeline = build(corpus(), model);

    let events = collect(&pipeline, follow_up("Evaluation methods for RAG")).await;

    let n = events.len();
    assert!(matches!(
        &events[n - 2],
        PipelineEvent::Error { stage: None, .. }
    ));
    assert!(matches!(
        &events[n - 1],
        PipelineEvent::Complete {
            outcome: Outcome::Errored,
            ..
        }
    ));
    assert_single_terminal(&events);
}

#[tokio::test]
async fn test_invalid_request_is_rejected() {
    let connector = corpus();
    let pipeline = build(Arc::clone(&connector), Arc::new(ScriptedModel::new()));

    let events = collect(&pipeline, ResearchRequest::new("   ")).await;

    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        PipelineEvent::Error {
            stage: Some(Stage::Validation),
            ..
        }
    ));
    assert!(connector.seen_queries().is_empty());
}

#[tokio::test]
async fn test_sse_frames_end_with_done() {
    let pipeline = build(corpus(), Arc::new(ScriptedModel::new()));
    let events = collect(&pipeline, ResearchRequest::new("Tell me about RAG")).await;

    let frames: Vec<String> = events.iter().map(|e| e.to_sse_frame().unwrap()).collect();
    assert!(frames.iter().all(|f| f.starts_with("data: ")));
    assert!(frames.last().unwrap().ends_with(SSE_DONE));
    assert_eq!(
        frames.iter().filter(|f| f.contains("[DONE]")).count(),
        1
    );
}
