//! Document store: chunk, embed, index and search search results.
//!
//! Content dedup works on the `doc_hash` metadata key. Existing hashes are
//! read before the insert, so two concurrent writers can both store the same
//! document; dedup is at-least-once.

mod chunking;
mod document;

pub use chunking::{split_text, ChunkingConfig};
pub use document::{
    doc_hash, extract_abstract, render_content, EmbeddedDocumentMetadata, SentDocument,
    ACCESS_KEY, CONTENT_KEY, DOC_HASH_KEY,
};

use crate::config::Settings;
use crate::embedding::{self, Embedder};
use crate::error::StoreError;
use crate::federated::{AccessType, SearchResult};
use crate::vector::{self, MetadataFilter, VectorPoint, VectorStore};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Counts from one `process_and_store` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreReport {
    pub documents_received: usize,
    /// Documents dropped because an earlier one in the batch had the same hash
    pub duplicate_documents: usize,
    pub chunks_stored: usize,
    /// Chunks whose document hash was already indexed
    pub chunks_skipped: usize,
}

pub struct DocumentStore {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    chunking: ChunkingConfig,
}

impl DocumentStore {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embedder,
            vectors,
            chunking,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, StoreError> {
        Ok(Self::new(
            embedding::from_settings(&settings.embedding)?,
            vector::from_settings(&settings.vector_store)?,
            settings.chunking,
        ))
    }

    /// Chunk, embed and index `results`, skipping already-indexed documents.
    pub async fn process_and_store(
        &self,
        results: &[SearchResult],
    ) -> Result<StoreReport, StoreError> {
        let mut report = StoreReport {
            documents_received: results.len(),
            ..StoreReport::default()
        };
        if results.is_empty() {
            return Ok(report);
        }

        let mut batch_hashes = HashSet::new();
        let mut chunks = Vec::new();
        for result in results {
            let metadata = EmbeddedDocumentMetadata::from_result(result);
            if !batch_hashes.insert(metadata.doc_hash.clone()) {
                report.duplicate_documents += 1;
                continue;
            }
            let content = render_content(&result.title, result.abstract_text.as_deref());
            for chunk in split_text(&content, &self.chunking) {
                chunks.push((chunk, metadata.clone()));
            }
        }

        let existing = match self.vectors.metadata_values(DOC_HASH_KEY).await {
            Ok(hashes) => hashes,
            Err(err) if err.is_index_failure() => {
                // The next write recreates the collection at the embedding size.
                warn!(error = %err, "indexed hashes unreadable, dropping collection");
                self.vectors.delete_collection().await?;
                HashSet::new()
            }
            Err(err) => return Err(err),
        };
        let before = chunks.len();
        chunks.retain(|(_, meta)| !existing.contains(&meta.doc_hash));
        report.chunks_skipped = before - chunks.len();

        if chunks.is_empty() {
            info!(
                received = report.documents_received,
                skipped = report.chunks_skipped,
                "no new document chunks to store"
            );
            return Ok(report);
        }

        let mut points = Vec::with_capacity(chunks.len());
        for (chunk, meta) in chunks {
            let vector = self.embedder.embed(&chunk).await?;
            let mut metadata = meta.to_map();
            metadata.insert(CONTENT_KEY.to_string(), Value::String(chunk));
            points.push(VectorPoint {
                id: Uuid::new_v4().to_string(),
                vector,
                metadata,
            });
        }
        let dimensions = points.first().map_or(0, |p| p.vector.len());
        report.chunks_stored = points.len();

        self.write_points(points, dimensions).await?;
        info!(
            received = report.documents_received,
            stored = report.chunks_stored,
            skipped = report.chunks_skipped,
            "stored document chunks"
        );
        Ok(report)
    }

    /// Up to `k` chunks closest to `query`, optionally restricted by access type.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        access: Option<AccessType>,
    ) -> Result<Vec<SentDocument>, StoreError> {
        let vector = self.embedder.embed(query).await?;
        let filter = access.map(|a| MetadataFilter::eq(ACCESS_KEY, a.as_str()));

        let hits = match self.vectors.query(&vector, k, filter.as_ref()).await {
            Ok(hits) => hits,
            Err(err) if err.is_index_failure() => {
                warn!(error = %err, "vector query failed, recreating collection");
                self.reset_collection(vector.len()).await?;
                self.vectors.query(&vector, k, filter.as_ref()).await?
            }
            Err(err) => return Err(err),
        };

        Ok(hits.into_iter().map(SentDocument::from_hit).collect())
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        self.vectors.count().await
    }

    /// Remove every indexed chunk.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.vectors.delete_collection().await
    }

    async fn write_points(
        &self,
        points: Vec<VectorPoint>,
        dimensions: usize,
    ) -> Result<(), StoreError> {
        match self.try_write(points.clone(), dimensions).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_index_failure() => {
                warn!(error = %err, "vector store write failed, recreating collection");
                self.reset_collection(dimensions).await?;
                self.vectors.upsert(points).await
            }
            Err(err) => Err(err),
        }
    }

    async fn try_write(&self, points: Vec<VectorPoint>, dimensions: usize) -> Result<(), StoreError> {
        self.vectors.ensure_collection(dimensions).await?;
        self.vectors.upsert(points).await
    }

    async fn reset_collection(&self, dimensions: usize) -> Result<(), StoreError> {
        self.vectors.delete_collection().await?;
        self.vectors.ensure_collection(dimensions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::federated::AccessInfo;
    use crate::vector::InMemoryVectorStore;

    fn store() -> DocumentStore {
        DocumentStore::new(
            Arc::new(HashingEmbedder::new(64)),
            Arc::new(InMemoryVectorStore::new()),
            ChunkingConfig::default(),
        )
    }

    fn result(title: &str, abstract_text: &str, open: bool) -> SearchResult {
        let access = if open {
            AccessInfo::open_access()
        } else {
            AccessInfo::restricted()
        };
        SearchResult::new(title, title, "test", access).with_abstract(Some(abstract_text.into()))
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = store();
        let report = store.process_and_store(&[]).await.unwrap();
        assert_eq!(report, StoreReport::default());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_duplicates_are_dropped() {
        let store = store();
        let doc = result("Same paper", "Same abstract", true);
        let report = store
            .process_and_store(&[doc.clone(), doc])
            .await
            .unwrap();
        assert_eq!(report.duplicate_documents, 1);
        assert_eq!(report.chunks_stored, 1);
    }

    #[tokio::test]
    async fn long_abstracts_are_chunked() {
        let store = DocumentStore::new(
            Arc::new(HashingEmbedder::new(32)),
            Arc::new(InMemoryVectorStore::new()),
            ChunkingConfig {
                chunk_size: 80,
                chunk_overlap: 10,
            },
        );
        let long = "sentence about retrieval models. ".repeat(10);
        let report = store
            .process_and_store(&[result("Long one", &long, false)])
            .await
            .unwrap();
        assert!(report.chunks_stored > 1);
        assert_eq!(store.count().await.unwrap(), report.chunks_stored);
    }

    #[tokio::test]
    async fn clear_empties_the_index() {
        let store = store();
        store
            .process_and_store(&[result("A paper", "abstract", true)])
            .await
            .unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store
            .similarity_search("paper", 5, None)
            .await
            .unwrap()
            .is_empty());
    }
}
