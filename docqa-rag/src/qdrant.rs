//! Qdrant vector index backend.
//!
//! Provides [`QdrantVectorIndex`] which implements [`VectorIndex`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Qdrant only accepts UUID or integer point ids, so every chunk id is mapped
//! to a deterministic UUID v5 and the chunk id itself is kept in the payload.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::qdrant::QdrantVectorIndex;
//!
//! let index = QdrantVectorIndex::new("http://localhost:6334", "docqa", DistanceMetric::Cosine)?;
//! index.add(&records).await?;
//! let nearest = index.query(&query_embedding, 3).await?;
//! ```

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    GetPointsBuilder, PointId, PointStruct, PointsIdsList, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::document::{ChunkMetadata, RetrievalResult, RetrievedChunk, VectorRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::{DistanceMetric, VectorIndex, batch_dimensions};

const BACKEND: &str = "qdrant";
const SCROLL_PAGE: u32 = 256;

/// A [`VectorIndex`] backed by a single [Qdrant](https://qdrant.tech/) collection.
///
/// The collection is created on the first write, sized to that batch's
/// dimensionality and using the configured metric.
pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
    metric: DistanceMetric,
    write_lock: Mutex<()>,
}

impl QdrantVectorIndex {
    /// Connect to the Qdrant server at `url` and use `collection`.
    pub fn new(url: &str, collection: impl Into<String>, metric: DistanceMetric) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build qdrant client: {e}")))?;
        Ok(Self::from_client(client, collection, metric))
    }

    /// Wrap an existing client.
    pub fn from_client(client: Qdrant, collection: impl Into<String>, metric: DistanceMetric) -> Self {
        Self { client, collection: collection.into(), metric, write_lock: Mutex::new(()) }
    }

    /// Deterministic point id for a chunk id.
    pub fn point_id(chunk_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
    }

    fn qdrant_distance(&self) -> Distance {
        match self.metric {
            DistanceMetric::Cosine => Distance::Cosine,
            DistanceMetric::L2 => Distance::Euclid,
            DistanceMetric::InnerProduct => Distance::Dot,
        }
    }

    /// Convert a Qdrant score into a distance where lower is closer.
    fn score_to_distance(&self, score: f32) -> f32 {
        match self.metric {
            DistanceMetric::L2 => score,
            DistanceMetric::Cosine | DistanceMetric::InnerProduct => 1.0 - score,
        }
    }

    fn read_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::index_read(BACKEND, e.to_string())
    }

    fn write_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::index_write(BACKEND, e.to_string())
    }

    async fn exists(&self) -> Result<bool> {
        self.client.collection_exists(&self.collection).await.map_err(Self::read_err)
    }

    /// Vector size of the collection, or `None` if it does not exist yet.
    async fn dimensions(&self) -> Result<Option<usize>> {
        if !self.exists().await? {
            return Ok(None);
        }
        let info = self.client.collection_info(&self.collection).await.map_err(Self::read_err)?;
        let size = info
            .result
            .and_then(|info| info.config)
            .and_then(|config| config.params)
            .and_then(|params| params.vectors_config)
            .and_then(|vectors| vectors.config)
            .and_then(|config| match config {
                VectorsConfigKind::Params(params) => Some(params.size as usize),
                VectorsConfigKind::ParamsMap(_) => None,
            });
        size.map(Some).ok_or_else(|| {
            RagError::index_read(BACKEND, "collection does not use a single unnamed vector")
        })
    }

    /// Every stored point, optionally restricted to one source.
    async fn scroll(&self, source: Option<&str>) -> Result<Vec<HashMap<String, QdrantValue>>> {
        if !self.exists().await? {
            return Ok(Vec::new());
        }

        let mut payloads = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut request = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_PAGE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(source) = source {
                request =
                    request.filter(Filter::must([Condition::matches("source", source.to_string())]));
            }
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }

            let page = self.client.scroll(request).await.map_err(Self::read_err)?;
            payloads.extend(page.result.into_iter().map(|point| point.payload));
            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(payloads)
    }

    fn to_point(record: &VectorRecord) -> Result<PointStruct> {
        let payload = Payload::try_from(serde_json::json!({
            "chunk_id": record.id,
            "source": record.metadata.source,
            "page_number": record.metadata.page_number,
            "content": record.content,
        }))
        .map_err(|e| RagError::index_write(BACKEND, format!("invalid payload: {e}")))?;
        Ok(PointStruct::new(Self::point_id(&record.id), record.embedding.clone(), payload))
    }
}

fn payload_string(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
    match payload.get(key).and_then(|value| value.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn payload_u32(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<u32> {
    match payload.get(key).and_then(|value| value.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => u32::try_from(*n).ok(),
        Some(Kind::DoubleValue(n)) => Some(*n as u32),
        _ => None,
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn add(&self, records: &[VectorRecord]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let established = self.dimensions().await.map_err(|e| match e {
            RagError::IndexRead { backend, message } => RagError::IndexWrite { backend, message },
            other => other,
        })?;
        let Some(dimensions) = batch_dimensions(BACKEND, records, established)? else {
            return Ok(0);
        };

        if established.is_none() {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(dimensions as u64, self.qdrant_distance()),
                    ),
                )
                .await
                .map_err(Self::write_err)?;
            debug!(collection = %self.collection, dimensions, metric = %self.metric, "created qdrant collection");
        }

        let mut points = Vec::with_capacity(records.len());
        for record in records {
            points.push(Self::to_point(record)?);
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(Self::write_err)?;

        let committed = records.iter().map(|r| r.id.as_str()).collect::<BTreeSet<_>>().len();
        debug!(collection = %self.collection, count = committed, "upserted records to qdrant");
        Ok(committed)
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidQuery("k must be at least 1".to_string()));
        }
        let Some(dimensions) = self.dimensions().await? else {
            return Ok(Vec::new());
        };
        if embedding.len() != dimensions {
            return Err(RagError::index_read(
                BACKEND,
                format!("query has {} dimensions, index has {dimensions}", embedding.len()),
            ));
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, embedding.to_vec(), k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(Self::read_err)?;

        let mut results: RetrievalResult = response
            .result
            .into_iter()
            .map(|scored| RetrievedChunk {
                id: payload_string(&scored.payload, "chunk_id").unwrap_or_default(),
                content: payload_string(&scored.payload, "content").unwrap_or_default(),
                metadata: ChunkMetadata {
                    source: payload_string(&scored.payload, "source").unwrap_or_default(),
                    page_number: payload_u32(&scored.payload, "page_number").unwrap_or_default(),
                },
                distance: self.score_to_distance(scored.score),
            })
            .collect();
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));

        debug!(collection = %self.collection, k, returned = results.len(), "searched qdrant");
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        if !self.exists().await? {
            return Ok(0);
        }
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(Self::read_err)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or_default())
    }

    async fn list_sources(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .scroll(None)
            .await?
            .iter()
            .filter_map(|payload| payload_string(payload, "source"))
            .collect())
    }

    async fn delete(&self, ids: &[&str]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock().await;
        if !self.exists().await.map_err(|e| RagError::index_write(BACKEND, e.to_string()))? {
            return Ok(0);
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| Self::point_id(id).into()).collect();
        let existing = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, point_ids.clone())
                    .with_payload(false)
                    .with_vectors(false),
            )
            .await
            .map_err(Self::write_err)?
            .result
            .len();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(Self::write_err)?;

        debug!(collection = %self.collection, count = existing, "deleted points from qdrant");
        Ok(existing)
    }

    async fn ids_for_source(&self, source: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .scroll(Some(source))
            .await?
            .iter()
            .filter_map(|payload| payload_string(payload, "chunk_id"))
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
