//! Events emitted by a pipeline run, and their SSE framing.

use crate::llm::DatabaseQuery;
use crate::store::SentDocument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel frame written after the terminal `complete` event.
pub const SSE_DONE: &str = "data: [DONE]\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Clarification,
    QueryGeneration,
    Searching,
    Deduplicating,
    Embedding,
    Retrieving,
    Reranking,
    Generating,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::Clarification => "clarification",
            Stage::QueryGeneration => "query_generation",
            Stage::Searching => "searching",
            Stage::Deduplicating => "deduplicating",
            Stage::Embedding => "embedding",
            Stage::Retrieving => "retrieving",
            Stage::Reranking => "reranking",
            Stage::Generating => "generating",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Stopped,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Status {
        stage: Stage,
        message: String,
    },
    Queries {
        queries: Vec<DatabaseQuery>,
    },
    Documents {
        documents: Vec<SentDocument>,
    },
    ResponseChunk {
        content: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
    },
    /// Always the last event of a run.
    Complete {
        processing_time_ms: u64,
        total_documents: usize,
        outcome: Outcome,
    },
}

impl PipelineEvent {
    pub fn status(stage: Stage, message: impl Into<String>) -> Self {
        PipelineEvent::Status {
            stage,
            message: message.into(),
        }
    }

    pub fn chunk(content: impl Into<String>) -> Self {
        PipelineEvent::ResponseChunk {
            content: content.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Complete { .. })
    }

    /// `data: {json}\n\n`, followed by the `[DONE]` sentinel for the terminal event.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        let mut frame = format!("data: {}\n\n", serde_json::to_string(self)?);
        if self.is_terminal() {
            frame.push_str(SSE_DONE);
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_are_tagged_snake_case() {
        let value = serde_json::to_value(PipelineEvent::chunk("Hi")).unwrap();
        assert_eq!(value, json!({"type": "response_chunk", "content": "Hi"}));

        let value = serde_json::to_value(PipelineEvent::status(Stage::QueryGeneration, "go")).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["stage"], "query_generation");

        let value = serde_json::to_value(PipelineEvent::Error {
            message: "boom".into(),
            stage: None,
        })
        .unwrap();
        assert!(value.get("stage").is_none());
    }

    #[test]
    fn sse_frames() {
        let frame = PipelineEvent::chunk("x").to_sse_frame().unwrap();
        assert_eq!(frame, "data: {\"type\":\"response_chunk\",\"content\":\"x\"}\n\n");

        let done = PipelineEvent::Complete {
            processing_time_ms: 5,
            total_documents: 2,
            outcome: Outcome::Stopped,
        }
        .to_sse_frame()
        .unwrap();
        assert!(done.starts_with("data: {\"type\":\"complete\""));
        assert!(done.ends_with("\n\ndata: [DONE]\n\n"));
    }

    #[test]
    fn round_trips_from_json() {
        let raw = json!({"type": "complete", "processing_time_ms": 1, "total_documents": 0, "outcome": "errored"});
        let event: PipelineEvent = serde_json::from_value(raw).unwrap();
        assert!(event.is_terminal());
    }
}
