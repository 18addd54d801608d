//! Local feature-hashing embedding provider.
//!
//! [`HashingEmbedder`] needs no model files or network access. Each lowercase
//! alphanumeric token is hashed with XxHash64 into one of `dimensions`
//! buckets; the resulting term-count vector is L2-normalized. Texts sharing
//! vocabulary end up close under cosine distance, which is enough for
//! keyword-level retrieval, offline deployments, and deterministic tests.

use std::hash::Hasher;

use async_trait::async_trait;
use twox_hash::XxHash64;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Default number of hash buckets.
pub const DEFAULT_DIMENSIONS: usize = 512;

const SEED: u64 = 0;

/// A deterministic bag-of-words embedder based on feature hashing.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: DEFAULT_DIMENSIONS }
    }
}

impl HashingEmbedder {
    /// Create an embedder producing vectors of `dimensions` length.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `dimensions == 0`.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::Config("hashing embedder needs at least one dimension".into()));
        }
        Ok(Self { dimensions })
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = XxHash64::with_seed(SEED);
        hasher.write(token.as_bytes());
        (hasher.finish() % self.dimensions as u64) as usize
    }

    /// Embed synchronously. Text without tokens maps to the zero vector.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        for token in tokens(text) {
            vector[self.bucket(&token)] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_sync(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "Hashing"
    }
}
