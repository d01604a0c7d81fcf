use super::Embedder;
use crate::connectors::USER_AGENT;
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embeddings from the Mistral `/v1/embeddings` endpoint.
pub struct MistralEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl MistralEmbedder {
    pub fn new(base_url: &str, api_key: String, model: &str) -> Result<Self, StoreError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StoreError::Embedding(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for MistralEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: [text],
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Embedding(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Embedding(format!(
                "embedding request returned {}: {}",
                status, message
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Embedding(e.to_string()))?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StoreError::Embedding("response contained no embedding".to_string()))?;
        debug!(model = %self.model, dims = vector.len(), "embedded text");
        Ok(vector)
    }
}
