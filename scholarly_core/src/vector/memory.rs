use super::{cosine_similarity, MetadataFilter, VectorHit, VectorPoint, VectorStore};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::RwLock;

#[derive(Debug)]
struct Collection {
    dimensions: usize,
    points: Vec<VectorPoint>,
}

/// Process-local vector store with brute-force cosine search.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collection: RwLock<Option<Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vector size of the current collection, if one exists.
    pub async fn dimensions(&self) -> Option<usize> {
        self.collection.read().await.as_ref().map(|c| c.dimensions)
    }
}

fn check_dimensions(expected: usize, actual: usize) -> Result<(), StoreError> {
    if expected == actual {
        Ok(())
    } else {
        Err(StoreError::DimensionMismatch { expected, actual })
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<(), StoreError> {
        let mut guard = self.collection.write().await;
        match guard.as_ref() {
            Some(existing) => check_dimensions(existing.dimensions, dimensions),
            None => {
                *guard = Some(Collection {
                    dimensions,
                    points: Vec::new(),
                });
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), StoreError> {
        let mut guard = self.collection.write().await;
        let collection = guard
            .as_mut()
            .ok_or_else(|| StoreError::CollectionMissing("memory collection".to_string()))?;

        for point in &points {
            check_dimensions(collection.dimensions, point.vector.len())?;
        }
        for point in points {
            match collection.points.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => collection.points.push(point),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>, StoreError> {
        let guard = self.collection.read().await;
        let Some(collection) = guard.as_ref() else {
            return Ok(Vec::new());
        };
        check_dimensions(collection.dimensions, vector.len())?;

        let mut hits: Vec<VectorHit> = collection
            .points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.metadata)))
            .map(|p| VectorHit {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.vector),
                metadata: p.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn metadata_values(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        let guard = self.collection.read().await;
        Ok(guard
            .as_ref()
            .map(|c| {
                c.points
                    .iter()
                    .filter_map(|p| p.metadata.get(key).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self
            .collection
            .read()
            .await
            .as_ref()
            .map_or(0, |c| c.points.len()))
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        *self.collection.write().await = None;
        Ok(())
    }
}
