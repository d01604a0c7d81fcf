use crate::error::PipelineError;
use crate::federated::{AccessType, MAX_RESULTS_LIMIT};
use crate::llm::{ChatMessage, ChatRole};
use serde::{Deserialize, Serialize};

const MAX_TOP_K: usize = 100;

fn default_true() -> bool {
    true
}

/// A research question plus the options that shape one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    /// Latest user message
    pub query: String,

    /// Earlier turns, oldest first, not including `query`
    #[serde(default)]
    pub history: Vec<ChatMessage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub databases: Option<Vec<String>>,

    /// Per-provider candidates for each generated query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,

    /// Chunks retrieved for answering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_filter: Option<AccessType>,

    /// Emit status, query and document events, not only the answer
    #[serde(default)]
    pub stream_events: bool,

    /// Ask clarifying questions instead of searching on the first user turn
    #[serde(default = "default_true")]
    pub clarify_first_turn: bool,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            history: Vec::new(),
            databases: None,
            max_results: None,
            top_k: None,
            access_filter: None,
            stream_events: false,
            clarify_first_turn: true,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_databases(mut self, databases: Vec<String>) -> Self {
        self.databases = Some(databases);
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_access_filter(mut self, access: Option<AccessType>) -> Self {
        self.access_filter = access;
        self
    }

    pub fn with_stream_events(mut self, enabled: bool) -> Self {
        self.stream_events = enabled;
        self
    }

    pub fn with_clarify_first_turn(mut self, enabled: bool) -> Self {
        self.clarify_first_turn = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.query.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("query cannot be empty".into()));
        }
        if let Some(n) = self.max_results {
            if !(1..=MAX_RESULTS_LIMIT).contains(&n) {
                return Err(PipelineError::InvalidRequest(format!(
                    "max_results must be between 1 and {}",
                    MAX_RESULTS_LIMIT
                )));
            }
        }
        if let Some(k) = self.top_k {
            if !(1..=MAX_TOP_K).contains(&k) {
                return Err(PipelineError::InvalidRequest(format!(
                    "top_k must be between 1 and {}",
                    MAX_TOP_K
                )));
            }
        }
        Ok(())
    }

    /// History followed by the current query as a user message.
    pub fn conversation(&self) -> Vec<ChatMessage> {
        let mut conversation = self.history.clone();
        conversation.push(ChatMessage::user(self.query.clone()));
        conversation
    }

    /// Whether the current query is the only user message so far.
    pub fn is_first_turn(&self) -> bool {
        !self.history.iter().any(|m| m.role == ChatRole::User)
    }
}
