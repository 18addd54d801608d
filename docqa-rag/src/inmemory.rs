//! In-memory vector index with optional JSON snapshot persistence.
//!
//! This module provides [`InMemoryVectorIndex`], a vector index backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. Without a snapshot path it
//! is suitable for tests and small deployments; with one
//! ([`InMemoryVectorIndex::open`]) every successful write is flushed to disk
//! before the call returns.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::document::{RetrievalResult, RetrievedChunk, VectorRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::{DistanceMetric, VectorIndex, batch_dimensions};

const BACKEND: &str = "InMemory";

#[derive(Debug, Default)]
struct IndexState {
    dimensions: Option<usize>,
    records: HashMap<String, VectorRecord>,
}

/// On-disk layout of a snapshot.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    metric: DistanceMetric,
    dimensions: Option<usize>,
    records: Vec<VectorRecord>,
}

/// An in-memory vector index using a brute-force scan for queries.
///
/// Writes take the write lock for the whole batch, including the snapshot
/// flush, so concurrent `add` calls are serialized and queries never observe
/// a partially written batch.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorIndex, DistanceMetric, VectorIndex};
///
/// let index = InMemoryVectorIndex::open("index.json", DistanceMetric::Cosine).await?;
/// index.add(&records).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    metric: DistanceMetric,
    state: RwLock<IndexState>,
    snapshot_path: Option<PathBuf>,
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new(DistanceMetric::default())
    }
}

impl InMemoryVectorIndex {
    /// Create a new empty, non-persistent index.
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric, state: RwLock::new(IndexState::default()), snapshot_path: None }
    }

    /// Open a persistent index backed by a JSON snapshot at `path`.
    ///
    /// A missing file starts an empty index; the file is created on the
    /// first successful write.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexRead`] if the snapshot cannot be read or
    /// parsed or its records disagree on dimensionality, and
    /// [`RagError::Config`] if it was written with a different metric.
    pub async fn open(path: impl AsRef<Path>, metric: DistanceMetric) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    RagError::index_read(
                        BACKEND,
                        format!("invalid snapshot '{}': {e}", path.display()),
                    )
                })?;
                if snapshot.metric != metric {
                    return Err(RagError::Config(format!(
                        "snapshot '{}' uses the {} metric but {metric} was requested",
                        path.display(),
                        snapshot.metric
                    )));
                }
                let dimensions =
                    match batch_dimensions(BACKEND, &snapshot.records, snapshot.dimensions) {
                        Ok(found) => found.or(snapshot.dimensions),
                        Err(e) => {
                            let detail = match e {
                                RagError::IndexWrite { message, .. } => message,
                                other => other.to_string(),
                            };
                            return Err(RagError::index_read(
                                BACKEND,
                                format!("invalid snapshot '{}': {detail}", path.display()),
                            ));
                        }
                    };
                let records = snapshot.records.into_iter().map(|r| (r.id.clone(), r)).collect();
                IndexState { dimensions, records }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexState::default(),
            Err(e) => {
                return Err(RagError::index_read(
                    BACKEND,
                    format!("failed to read snapshot '{}': {e}", path.display()),
                ));
            }
        };

        info!(path = %path.display(), records = state.records.len(), %metric, "opened index snapshot");
        Ok(Self { metric, state: RwLock::new(state), snapshot_path: Some(path) })
    }

    /// The snapshot path, if this index is persistent.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// The established dimensionality, if any record was ever written.
    pub async fn dimensions(&self) -> Option<usize> {
        self.state.read().await.dimensions
    }

    /// Write the snapshot to a temp file, sync it, and rename it into place.
    async fn persist(&self, state: &IndexState) -> std::io::Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let mut records: Vec<VectorRecord> = state.records.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        let snapshot = Snapshot { metric: self.metric, dimensions: state.dimensions, records };
        let bytes = serde_json::to_vec(&snapshot)?;

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), bytes = bytes.len(), "flushed index snapshot");
        Ok(())
    }
}

/// Undo a partially applied batch, most recent change first.
fn rollback(state: &mut IndexState, undo: Vec<(String, Option<VectorRecord>)>) {
    for (id, previous) in undo.into_iter().rev() {
        match previous {
            Some(record) => {
                state.records.insert(id, record);
            }
            None => {
                state.records.remove(&id);
            }
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, records: &[VectorRecord]) -> Result<usize> {
        let mut state = self.state.write().await;
        let Some(dims) = batch_dimensions(BACKEND, records, state.dimensions)? else {
            return Ok(0);
        };

        let mut undo = Vec::new();
        let mut seen = HashSet::new();
        for record in records {
            let previous = state.records.insert(record.id.clone(), record.clone());
            if seen.insert(record.id.clone()) {
                undo.push((record.id.clone(), previous));
            }
        }
        let previous_dims = state.dimensions.replace(dims);

        if let Err(e) = self.persist(&state).await {
            rollback(&mut state, undo);
            state.dimensions = previous_dims;
            return Err(RagError::index_write(
                BACKEND,
                format!("snapshot write failed, batch of {} rolled back: {e}", records.len()),
            ));
        }

        debug!(count = seen.len(), total = state.records.len(), "upserted records");
        Ok(seen.len())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidQuery("k must be at least 1".to_string()));
        }

        let state = self.state.read().await;
        if state.records.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(dims) = state.dimensions.filter(|dims| *dims != embedding.len()) {
            return Err(RagError::index_read(
                BACKEND,
                format!("query embedding has {} dimensions but the index has {dims}", embedding.len()),
            ));
        }

        let mut scored: Vec<RetrievedChunk> = state
            .records
            .values()
            .map(|record| RetrievedChunk {
                id: record.id.clone(),
                content: record.content.clone(),
                metadata: record.metadata.clone(),
                distance: self.metric.distance(&record.embedding, embedding),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.records.len())
    }

    async fn list_sources(&self) -> Result<BTreeSet<String>> {
        let state = self.state.read().await;
        Ok(state.records.values().map(|r| r.metadata.source.clone()).collect())
    }

    async fn delete(&self, ids: &[&str]) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut undo = Vec::new();
        for id in ids {
            if let Some(previous) = state.records.remove(*id) {
                undo.push((id.to_string(), Some(previous)));
            }
        }
        if undo.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.persist(&state).await {
            rollback(&mut state, undo);
            return Err(RagError::index_write(
                BACKEND,
                format!("snapshot write failed, delete rolled back: {e}"),
            ));
        }
        Ok(undo.len())
    }

    async fn ids_for_source(&self, source: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let mut ids: Vec<String> = state
            .records
            .values()
            .filter(|r| r.metadata.source == source)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn backend(&self) -> &str {
        BACKEND
    }
}
