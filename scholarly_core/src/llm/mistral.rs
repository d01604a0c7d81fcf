use super::prompts::{answer_messages, clarification_messages, query_messages};
use super::{parse_queries, ChatMessage, DatabaseQuery, LanguageModel, TokenStream};
use crate::config::LlmSettings;
use crate::connectors::USER_AGENT;
use crate::error::LlmError;
use crate::store::SentDocument;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions against Mistral's OpenAI-compatible API.
pub struct MistralChat {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl MistralChat {
    pub fn new(settings: &LlmSettings, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1/chat/completions",
                settings.base_url.trim_end_matches('/')
            ),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        stream: bool,
        json_mode: bool,
    ) -> Result<Response, LlmError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
            response_format: json_mode.then(|| json!({ "type": "json_object" })),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Provider {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response)
    }

    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let response: CompletionResponse = self.send(messages, false, true).await?.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("completion had no content".to_string()))
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let response = self.send(messages, true, false).await?;
        Ok(token_stream(
            response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
        ))
    }
}

#[async_trait]
impl LanguageModel for MistralChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_queries(
        &self,
        conversation: &[ChatMessage],
        max: usize,
    ) -> Result<Vec<DatabaseQuery>, LlmError> {
        let raw = self.complete_json(&query_messages(conversation, max)).await?;
        debug!(model = %self.model, "received generated queries");
        parse_queries(&raw, max)
    }

    async fn clarification_stream(
        &self,
        conversation: &[ChatMessage],
    ) -> Result<TokenStream, LlmError> {
        self.stream(&clarification_messages(conversation)).await
    }

    async fn answer_stream(
        &self,
        conversation: &[ChatMessage],
        documents: &[SentDocument],
    ) -> Result<TokenStream, LlmError> {
        self.stream(&answer_messages(conversation, documents)).await
    }
}

/// Decoded server-sent event from a streaming completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Token(String),
    Done,
}

/// Incremental decoder for `data:` lines of a completion stream.
///
/// Bytes are buffered until a full line arrives, so chunk boundaries may fall
/// anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, LlmError> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                events.push(SseEvent::Done);
                continue;
            }
            if data.is_empty() {
                continue;
            }

            let chunk: StreamChunk = serde_json::from_str(data)?;
            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if !text.is_empty() {
                events.push(SseEvent::Token(text));
            }
        }
        Ok(events)
    }
}

struct StreamState {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

fn token_stream(bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>) -> TokenStream {
    let state = StreamState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(token) = state.pending.pop_front() {
                return Some((Ok(token), state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => match state.decoder.push(&chunk) {
                    Ok(events) => {
                        for event in events {
                            match event {
                                SseEvent::Token(token) => state.pending.push_back(token),
                                SseEvent::Done => {
                                    state.finished = true;
                                    break;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        state.finished = true;
                        state.pending.clear();
                        return Some((Err(err), state));
                    }
                },
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(LlmError::Http(err)), state));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    #[test]
    fn decodes_tokens_and_done() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}{}data: [DONE]\n\n", frame("Hel"), frame("lo"));
        let events = decoder.push(input.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![
                SseEvent::Token("Hel".into()),
                SseEvent::Token("lo".into()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn buffers_partial_lines_and_split_characters() {
        let mut decoder = SseDecoder::new();
        let input = frame("naïve");
        let bytes = input.as_bytes();
        let split = input.find('ï').unwrap() + 1;
        assert!(decoder.push(&bytes[..split]).unwrap().is_empty());
        let events = decoder.push(&bytes[split..]).unwrap();
        assert_eq!(events, vec![SseEvent::Token("naïve".into())]);
    }

    #[test]
    fn ignores_comments_and_role_only_deltas() {
        let mut decoder = SseDecoder::new();
        let input = ": keep-alive\n\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n";
        assert!(decoder.push(input.as_bytes()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn token_stream_stops_at_done() {
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> = vec![
            Ok(frame("a").into_bytes()),
            Ok(format!("{}data: [DONE]\n\n{}", frame("b"), frame("ignored")).into_bytes()),
        ];
        let tokens: Vec<String> = token_stream(stream::iter(chunks).boxed())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn malformed_data_surfaces_an_error() {
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> = vec![Ok(b"data: {oops\n".to_vec())];
        let items: Vec<_> = token_stream(stream::iter(chunks).boxed()).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[test]
    fn json_mode_only_for_query_generation() {
        let messages = [ChatMessage::user("q")];
        let body = serde_json::to_value(CompletionRequest {
            model: "m",
            messages: &messages,
            temperature: 0.7,
            max_tokens: 2000,
            stream: true,
            response_format: None,
        })
        .unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
