//! Chat model collaborator for query generation and answer streaming.

mod mistral;
pub mod prompts;

pub use mistral::{MistralChat, SseDecoder, SseEvent};

use crate::config::LlmSettings;
use crate::error::LlmError;
use crate::store::SentDocument;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Incremental text from a streaming completion.
pub type TokenStream = BoxStream<'static, Result<String, LlmError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// One search to run against the academic providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseQuery {
    pub query: String,
    /// Short description of the aspect this query covers
    pub focus: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model(&self) -> &str;

    /// Derive between one and `max` search queries from the conversation.
    async fn generate_queries(
        &self,
        conversation: &[ChatMessage],
        max: usize,
    ) -> Result<Vec<DatabaseQuery>, LlmError>;

    /// Stream a reply asking the user to narrow their question.
    async fn clarification_stream(
        &self,
        conversation: &[ChatMessage],
    ) -> Result<TokenStream, LlmError>;

    /// Stream an answer grounded in `documents`.
    async fn answer_stream(
        &self,
        conversation: &[ChatMessage],
        documents: &[SentDocument],
    ) -> Result<TokenStream, LlmError>;
}

pub fn from_settings(settings: &LlmSettings) -> Result<Arc<dyn LanguageModel>, LlmError> {
    let api_key = settings
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or(LlmError::MissingApiKey("MISTRAL_API_KEY"))?;
    Ok(Arc::new(MistralChat::new(settings, api_key)?))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryPayload {
    Wrapped { queries: Vec<DatabaseQuery> },
    Bare(Vec<DatabaseQuery>),
}

/// Parse a JSON query list, either `{"queries": [...]}` or a bare array.
///
/// Blank queries are dropped and the list is capped at `max`.
pub fn parse_queries(raw: &str, max: usize) -> Result<Vec<DatabaseQuery>, LlmError> {
    let payload: QueryPayload = serde_json::from_str(raw.trim())?;
    let queries = match payload {
        QueryPayload::Wrapped { queries } | QueryPayload::Bare(queries) => queries,
    };
    let queries: Vec<DatabaseQuery> = queries
        .into_iter()
        .map(|q| DatabaseQuery {
            query: q.query.trim().to_string(),
            focus: q.focus.trim().to_string(),
        })
        .filter(|q| !q.query.is_empty())
        .take(max)
        .collect();
    if queries.is_empty() {
        return Err(LlmError::InvalidResponse(
            "model returned no usable queries".to_string(),
        ));
    }
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_and_bare_lists() {
        let wrapped = r#"{"queries": [{"query": " graph nets ", "focus": "methods"}, {"query": "", "focus": "x"}]}"#;
        let parsed = parse_queries(wrapped, 5).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].query, "graph nets");

        let bare = r#"[{"query": "a", "focus": "1"}, {"query": "b", "focus": "2"}, {"query": "c", "focus": "3"}]"#;
        assert_eq!(parse_queries(bare, 2).unwrap().len(), 2);
    }

    #[test]
    fn rejects_unusable_output() {
        assert!(matches!(
            parse_queries("not json", 5),
            Err(LlmError::SerdeJson(_))
        ));
        assert!(matches!(
            parse_queries(r#"{"queries": []}"#, 5),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn chat_roles_serialize_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
    }

    #[test]
    fn missing_key_is_reported() {
        assert!(matches!(
            from_settings(&LlmSettings::default()),
            Err(LlmError::MissingApiKey("MISTRAL_API_KEY"))
        ));
    }
}
