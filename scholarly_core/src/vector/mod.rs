//! Vector storage backends.
//!
//! A store holds a single collection of points. Point metadata is a flat JSON
//! object, and filters are exact matches on one metadata key.

mod memory;
mod qdrant;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantStore;

use crate::config::{VectorBackend, VectorStoreSettings};
use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    /// Similarity, higher is closer
    pub score: f32,
    pub metadata: Map<String, Value>,
}

/// Exact-match condition on one metadata key.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilter {
    pub key: String,
    pub value: Value,
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        metadata.get(&self.key) == Some(&self.value)
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create the collection if needed.
    ///
    /// Fails with [`StoreError::DimensionMismatch`] when the collection already
    /// exists with a different vector size.
    async fn ensure_collection(&self, dimensions: usize) -> Result<(), StoreError>;

    /// Insert points, replacing any with the same id.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), StoreError>;

    /// Up to `k` nearest points by cosine similarity, best first. A missing
    /// collection yields no hits.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>, StoreError>;

    /// Every distinct string value stored under `key`.
    async fn metadata_values(&self, key: &str) -> Result<HashSet<String>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Drop the collection and everything in it. Missing is not an error.
    async fn delete_collection(&self) -> Result<(), StoreError>;
}

/// Build the configured vector store.
pub fn from_settings(settings: &VectorStoreSettings) -> Result<Arc<dyn VectorStore>, StoreError> {
    match settings.backend {
        VectorBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        VectorBackend::Qdrant => Ok(Arc::new(QdrantStore::new(
            &settings.url,
            settings.api_key.clone(),
            &settings.collection,
        )?)),
    }
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
