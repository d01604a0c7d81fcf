use super::{RerankHit, RerankProvider};
use crate::connectors::USER_AGENT;
use crate::error::RerankError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Cohere `/v2/rerank` client.
pub struct CohereReranker {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl CohereReranker {
    pub fn new(base_url: &str, api_key: String, model: &str) -> Result<Self, RerankError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/v2/rerank", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl RerankProvider for CohereReranker {
    fn name(&self) -> &'static str {
        "cohere"
    }

    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, RerankError> {
        let body = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n,
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
            return Err(RerankError::Provider {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RerankError::InvalidResponse(e.to_string()))?;
        Ok(parsed
            .results
            .into_iter()
            .map(|r| RerankHit {
                index: r.index,
                relevance_score: r.relevance_score,
            })
            .collect())
    }
}
