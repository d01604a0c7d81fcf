use super::{MetadataFilter, VectorHit, VectorPoint, VectorStore};
use crate::connectors::USER_AGENT;
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::{debug, info};

const SCROLL_PAGE: usize = 256;

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

#[derive(Deserialize)]
struct VectorParams {
    size: usize,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct ScrollPage {
    points: Vec<ScrollPoint>,
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct ScrollPoint {
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

/// Qdrant over its REST API, one collection with cosine distance.
pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
}

impl QdrantStore {
    pub fn new(url: &str, api_key: Option<String>, collection: &str) -> Result<Self, StoreError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            collection: collection.to_string(),
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        self.authorize(request)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(format!("qdrant request failed: {}", err)))
    }

    async fn backend_error(&self, response: Response) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_status(status, &self.collection, body)
    }
}

/// Map a failed Qdrant response onto the store error taxonomy.
fn classify_status(status: StatusCode, collection: &str, body: String) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        StoreError::CollectionMissing(collection.to_string())
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        StoreError::Unavailable(format!("qdrant returned {}: {}", status, body))
    } else {
        StoreError::Backend(format!("qdrant returned {}: {}", status, body))
    }
}

fn point_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn filter_body(filter: &MetadataFilter) -> Value {
    json!({
        "must": [{ "key": filter.key, "match": { "value": filter.value } }]
    })
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<(), StoreError> {
        let response = self.send(self.client.get(self.collection_url(""))).await?;
        match response.status() {
            StatusCode::OK => {
                let info: Envelope<CollectionInfo> = response.json().await?;
                let expected = info.result.config.params.vectors.size;
                if expected != dimensions {
                    return Err(StoreError::DimensionMismatch {
                        expected,
                        actual: dimensions,
                    });
                }
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                let body = json!({ "vectors": { "size": dimensions, "distance": "Cosine" } });
                let response = self
                    .send(self.client.put(self.collection_url("")).json(&body))
                    .await?;
                if !response.status().is_success() {
                    return Err(self.backend_error(response).await);
                }
                info!(collection = %self.collection, dimensions, "created qdrant collection");
                Ok(())
            }
            _ => Err(self.backend_error(response).await),
        }
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        let body = json!({
            "points": points
                .into_iter()
                .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": p.metadata }))
                .collect::<Vec<_>>()
        });
        let response = self
            .send(
                self.client
                    .put(self.collection_url("/points"))
                    .query(&[("wait", "true")])
                    .json(&body),
            )
            .await?;
        if !response.status().is_success() {
            return Err(self.backend_error(response).await);
        }
        debug!(collection = %self.collection, count, "upserted points");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>, StoreError> {
        let mut body = json!({ "vector": vector, "limit": k, "with_payload": true });
        if let Some(filter) = filter {
            body["filter"] = filter_body(filter);
        }
        let response = self
            .send(
                self.client
                    .post(self.collection_url("/points/search"))
                    .json(&body),
            )
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            s if s.is_success() => {
                let parsed: Envelope<Vec<ScoredPoint>> = response.json().await?;
                Ok(parsed
                    .result
                    .into_iter()
                    .map(|p| VectorHit {
                        id: point_id(&p.id),
                        score: p.score,
                        metadata: p.payload.unwrap_or_default(),
                    })
                    .collect())
            }
            _ => Err(self.backend_error(response).await),
        }
    }

    async fn metadata_values(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        let mut values = HashSet::new();
        let mut offset: Option<Value> = None;
        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": { "include": [key] },
                "with_vector": false
            });
            if let Some(offset) = offset.take() {
                body["offset"] = offset;
            }
            let response = self
                .send(
                    self.client
                        .post(self.collection_url("/points/scroll"))
                        .json(&body),
                )
                .await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(values);
            }
            if !response.status().is_success() {
                return Err(self.backend_error(response).await);
            }
            let page: Envelope<ScrollPage> = response.json().await?;
            values.extend(page.result.points.into_iter().filter_map(|p| {
                p.payload?
                    .get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            }));
            match page.result.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => return Ok(values),
            }
        }
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let response = self
            .send(
                self.client
                    .post(self.collection_url("/points/count"))
                    .json(&json!({ "exact": true })),
            )
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(0),
            s if s.is_success() => {
                let parsed: Envelope<CountResult> = response.json().await?;
                Ok(parsed.result.count)
            }
            _ => Err(self.backend_error(response).await),
        }
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        let response = self.send(self.client.delete(self.collection_url(""))).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            info!(collection = %self.collection, "deleted qdrant collection");
            Ok(())
        } else {
            Err(self.backend_error(response).await)
        }
    }
}
