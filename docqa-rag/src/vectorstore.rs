//! Vector index trait and distance metrics.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{RetrievalResult, VectorRecord};
use crate::error::Result;

/// Distance metric used by a vector index. Lower distances mean more similar.
///
/// The metric is fixed when an index is created and used for every query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, in `[0, 2]`.
    #[default]
    Cosine,
    /// Euclidean distance.
    L2,
    /// `1 - dot_product`. Intended for normalized embeddings.
    #[serde(rename = "ip")]
    InnerProduct,
}

impl DistanceMetric {
    /// Compute the distance between two vectors of equal length.
    ///
    /// For [`Cosine`](Self::Cosine), a zero-magnitude vector is at distance
    /// `1.0` from everything (orthogonal).
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
            }
            DistanceMetric::L2 => {
                a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
            }
            DistanceMetric::InnerProduct => {
                1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>()
            }
        }
    }

    /// The short identifier used in configuration (`cosine`, `l2`, `ip`).
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "ip",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "ip" | "inner_product" | "dot" => Ok(DistanceMetric::InnerProduct),
            other => Err(format!("unknown distance metric '{other}' (expected cosine, l2, or ip)")),
        }
    }
}

/// A storage backend for chunk embeddings with nearest-neighbour search.
///
/// Implementations must allow concurrent queries and serialize concurrent
/// writes. A record becomes visible to queries only once the `add` call that
/// wrote it has returned successfully.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{VectorIndex, InMemoryVectorIndex};
///
/// let index = InMemoryVectorIndex::new(DistanceMetric::Cosine);
/// index.add(&records).await?;
/// let nearest = index.query(&query_embedding, 3).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert records by id and return how many were committed.
    ///
    /// The first successful write fixes the index dimensionality. A batch is
    /// written entirely or not at all.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexWrite`](crate::RagError::IndexWrite) on a
    /// dimensionality mismatch or backend failure; no record of the batch is
    /// committed in that case.
    async fn add(&self, records: &[VectorRecord]) -> Result<usize>;

    /// Return up to `k` records nearest to `embedding`, by ascending distance.
    ///
    /// An empty index yields an empty result.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult>;

    /// Number of live records.
    async fn count(&self) -> Result<usize>;

    /// Distinct sources across all stored records.
    async fn list_sources(&self) -> Result<BTreeSet<String>>;

    /// Delete records by id and return how many existed.
    async fn delete(&self, ids: &[&str]) -> Result<usize>;

    /// Ids of all records belonging to `source`.
    async fn ids_for_source(&self, source: &str) -> Result<Vec<String>>;

    /// The distance metric this index was created with.
    fn metric(&self) -> DistanceMetric;

    /// A short backend name used in errors and logs.
    fn backend(&self) -> &str;
}

/// Check a batch for empty or inconsistent embeddings before writing.
///
/// Returns the batch dimensionality, or `None` for an empty batch.
pub(crate) fn batch_dimensions(
    backend: &str,
    records: &[VectorRecord],
    established: Option<usize>,
) -> Result<Option<usize>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    let dims = first.embedding.len();
    if dims == 0 {
        return Err(crate::RagError::index_write(
            backend,
            format!("record '{}' has an empty embedding", first.id),
        ));
    }
    if let Some(bad) = records.iter().find(|r| r.embedding.len() != dims) {
        return Err(crate::RagError::index_write(
            backend,
            format!(
                "record '{}' has {} dimensions but the batch has {dims}",
                bad.id,
                bad.embedding.len()
            ),
        ));
    }
    if let Some(expected) = established.filter(|expected| *expected != dims) {
        return Err(crate::RagError::index_write(
            backend,
            format!("embedding has {dims} dimensions but the index expects {expected}"),
        ));
    }
    Ok(Some(dims))
}
