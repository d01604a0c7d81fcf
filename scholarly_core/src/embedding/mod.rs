//! Text embedding providers.
//!
//! The document store only needs one vector per text; batching is left to
//! the provider implementations.

mod mistral;

pub use mistral::MistralEmbedder;

use crate::config::{EmbeddingBackend, EmbeddingSettings};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, for logs and status output.
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
}

/// Build the configured embedder.
pub fn from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, StoreError> {
    match settings.provider {
        EmbeddingBackend::Mistral => {
            let api_key = settings
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    StoreError::Embedding(
                        "MISTRAL_API_KEY is not set; use the hashing embedder for offline runs"
                            .to_string(),
                    )
                })?;
            Ok(Arc::new(MistralEmbedder::new(
                &settings.base_url,
                api_key,
                &settings.model,
            )?))
        }
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(settings.dimensions))),
    }
}

/// Deterministic local embedder over hashed character trigrams.
///
/// Texts sharing many trigrams land close together under cosine similarity.
/// Vectors are L2-normalized; text without trigrams embeds to all zeros.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let normalized: Vec<char> = text
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .collect();

        for gram in normalized.windows(3) {
            let hash = fnv1a(gram);
            let index = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn fnv1a(chars: &[char]) -> u64 {
    let mut hash = FNV_OFFSET;
    let mut buf = [0u8; 4];
    for c in chars {
        for byte in c.encode_utf8(&mut buf).bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model(&self) -> &str {
        "hashing-trigram"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        Ok(self.embed_sync(text))
    }
}
