//! Question-answering service over a private document collection.
//!
//! The [`RagService`] coordinates ingestion (chunk → embed → add) and
//! question answering (embed → query → gate → assemble → generate) by
//! composing an [`EmbeddingProvider`], a [`VectorIndex`], an
//! [`AnswerGenerator`], and a [`Chunker`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{RagService, RagConfig, InMemoryVectorIndex, HashingEmbedder};
//!
//! let service = RagService::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbedder::default()))
//!     .vector_index(Arc::new(InMemoryVectorIndex::default()))
//!     .generator(Arc::new(my_generator))
//!     .build()?;
//!
//! service.ingest(&document.pages).await?;
//! let answer = service.query("What color is the sky?", None).await?;
//! ```

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Page, RetrievalResult, VectorRecord};
use crate::embedding::{EmbeddingProvider, embed_exact};
use crate::error::{RagError, Result};
use crate::gate::{Mode, RelevanceGate};
use crate::generation::AnswerGenerator;
use crate::prompt::{PromptContext, validate_question};
use crate::vectorstore::{DistanceMetric, VectorIndex};

/// Outcome of a successful ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Number of chunks committed to the index.
    pub chunks_added: usize,
    /// Number of stale chunks removed by a replacing ingestion.
    pub chunks_removed: usize,
    /// Number of empty or whitespace-only pages that were skipped.
    pub pages_skipped: usize,
}

/// An answer together with the evidence it was conditioned on.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    /// The generated answer text.
    pub answer: String,
    /// `"grounded"` or `"fallback"`.
    pub mode: &'static str,
    /// The full retrieval result, ascending by distance.
    pub evidence: RetrievalResult,
}

/// Read-only index statistics.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    /// Number of live records.
    pub indexed_chunks: usize,
    /// The index distance metric.
    pub metric: DistanceMetric,
}

/// The retrieval-and-fallback question-answering service.
///
/// Construct one per process via [`RagService::builder()`] and share it as
/// `Arc<RagService>`; every method takes `&self`.
pub struct RagService {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<dyn VectorIndex>,
    generator: Arc<dyn AnswerGenerator>,
    chunker: Arc<dyn Chunker>,
    gate: RelevanceGate,
    replace_lock: Mutex<()>,
}

impl RagService {
    /// Create a new [`RagServiceBuilder`].
    pub fn builder() -> RagServiceBuilder {
        RagServiceBuilder::default()
    }

    /// Return a reference to the service configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector index.
    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.vector_index
    }

    /// Return the relevance gate.
    pub fn gate(&self) -> &RelevanceGate {
        &self.gate
    }

    /// Ingest pages: chunk → embed → add.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] if the provider fails or returns the
    /// wrong number of vectors, and [`RagError::IndexWrite`] if the index
    /// rejects the batch. In both cases no chunk of the call is committed.
    pub async fn ingest(&self, pages: &[Page]) -> Result<IngestReport> {
        let pages_skipped = count_blank(pages);
        let Some(records) = self.embed_pages(pages).await? else {
            info!(pages = pages.len(), pages_skipped, chunk_count = 0, "ingested pages (empty)");
            return Ok(IngestReport { chunks_added: 0, chunks_removed: 0, pages_skipped });
        };

        let chunks_added = self.write_records(&records).await?;
        info!(pages = pages.len(), pages_skipped, chunks_added, "ingested pages");
        Ok(IngestReport { chunks_added, chunks_removed: 0, pages_skipped })
    }

    /// Ingest pages as the new content of their sources.
    ///
    /// The new chunks are written first; only once that write succeeds are
    /// the source's older chunks that the new content did not overwrite
    /// removed. A failed call leaves the previously indexed chunks in place.
    /// Replacing ingestions run one at a time.
    ///
    /// # Errors
    ///
    /// Same as [`RagService::ingest`]. If removing stale chunks fails after
    /// the new ones were committed, the [`RagError::IndexWrite`] is returned
    /// and the stale chunks remain alongside the new ones.
    pub async fn ingest_replacing(&self, pages: &[Page]) -> Result<IngestReport> {
        let _guard = self.replace_lock.lock().await;

        let pages_skipped = count_blank(pages);
        let records = self.embed_pages(pages).await?.unwrap_or_default();
        let chunks_added =
            if records.is_empty() { 0 } else { self.write_records(&records).await? };

        let fresh: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let sources: BTreeSet<&str> = pages.iter().map(|p| p.source.as_str()).collect();
        let mut chunks_removed = 0;
        for source in sources {
            let stale: Vec<String> = self
                .vector_index
                .ids_for_source(source)
                .await?
                .into_iter()
                .filter(|id| !fresh.contains(id.as_str()))
                .collect();
            if stale.is_empty() {
                continue;
            }
            let stale_refs: Vec<&str> = stale.iter().map(String::as_str).collect();
            let removed = self.vector_index.delete(&stale_refs).await.map_err(|e| {
                error!(
                    backend = self.vector_index.backend(),
                    source,
                    chunks_added,
                    error = %e,
                    "removing stale chunks failed after replacement was committed"
                );
                e
            })?;
            chunks_removed += removed;
        }

        info!(pages = pages.len(), pages_skipped, chunks_added, chunks_removed, "replaced pages");
        Ok(IngestReport { chunks_added, chunks_removed, pages_skipped })
    }

    /// Chunk and embed `pages`; `None` when no page has content.
    async fn embed_pages(&self, pages: &[Page]) -> Result<Option<Vec<VectorRecord>>> {
        let chunks = self.chunker.chunk(pages);
        if chunks.is_empty() {
            return Ok(None);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = embed_exact(self.embedding_provider.as_ref(), &texts).await.map_err(|e| {
            error!(chunk_count = chunks.len(), error = %e, "embedding failed during ingestion");
            e
        })?;

        Ok(Some(
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| VectorRecord::from_chunk(chunk, embedding))
                .collect(),
        ))
    }

    async fn write_records(&self, records: &[VectorRecord]) -> Result<usize> {
        self.vector_index.add(records).await.map_err(|e| {
            error!(
                backend = self.vector_index.backend(),
                chunk_count = records.len(),
                chunks_committed = 0,
                error = %e,
                "index write failed during ingestion"
            );
            e
        })
    }

    /// Embed `query_text` and return its nearest chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidQuery`] for blank text or `top_k == 0`,
    /// otherwise propagates embedding and index read failures.
    pub async fn retrieve(&self, query_text: &str, top_k: usize) -> Result<RetrievalResult> {
        let question = validate_question(query_text)?;
        if top_k == 0 {
            return Err(RagError::InvalidQuery("top_k must be at least 1".to_string()));
        }

        let query_embedding = self.embedding_provider.embed(question).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;

        self.vector_index.query(&query_embedding, top_k).await.map_err(|e| {
            error!(backend = self.vector_index.backend(), error = %e, "vector index query failed");
            e
        })
    }

    /// Answer a question: embed → query → gate → assemble → generate.
    ///
    /// `top_k` defaults to the configured value. The question is validated
    /// before any collaborator is called.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidQuery`] for blank text, otherwise the typed
    /// error of whichever step failed.
    pub async fn query(&self, query_text: &str, top_k: Option<usize>) -> Result<QueryAnswer> {
        let top_k = top_k.unwrap_or(self.config.top_k);
        let evidence = self.retrieve(query_text, top_k).await?;

        let mode = self.gate.decide(evidence.clone());
        let best_distance = evidence.first().map(|c| c.distance);
        match &mode {
            Mode::Grounded(chunks) => {
                info!(context_chunks = chunks.len(), ?best_distance, "relevant context found")
            }
            Mode::Fallback => warn!(
                ?best_distance,
                threshold = self.gate.threshold(),
                "no relevant context, falling back to general knowledge"
            ),
        }

        let prompt = PromptContext::new(query_text, &mode)?.render();
        let answer = self.generator.generate(&prompt).await.map_err(|e| {
            error!(generator = self.generator.name(), mode = mode.label(), error = %e, "answer generation failed");
            e
        })?;

        info!(mode = mode.label(), evidence = evidence.len(), "query completed");
        Ok(QueryAnswer { answer, mode: mode.label(), evidence })
    }

    /// Number of indexed chunks and the index metric.
    pub async fn status(&self) -> Result<IndexStatus> {
        let indexed_chunks = self.vector_index.count().await?;
        Ok(IndexStatus { indexed_chunks, metric: self.vector_index.metric() })
    }

    /// Sorted, deduplicated sources present in the index.
    pub async fn list_sources(&self) -> Result<Vec<String>> {
        Ok(self.vector_index.list_sources().await?.into_iter().collect())
    }

    /// Remove every chunk of `source` and return how many were removed.
    pub async fn delete_source(&self, source: &str) -> Result<usize> {
        let ids = self.vector_index.ids_for_source(source).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let removed = self.vector_index.delete(&id_refs).await?;
        info!(source, removed, "deleted source");
        Ok(removed)
    }
}

fn count_blank(pages: &[Page]) -> usize {
    pages.iter().filter(|p| p.content.trim().is_empty()).count()
}

/// Builder for constructing a [`RagService`].
///
/// All fields except `chunker` are required; the chunker defaults to a
/// [`RecursiveChunker`] using the configured size and overlap.
///
/// # Example
///
/// ```rust,ignore
/// let service = RagService::builder()
///     .config(RagConfig::from_env()?)
///     .embedding_provider(Arc::new(embedder))
///     .vector_index(Arc::new(index))
///     .generator(Arc::new(generator))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagServiceBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagServiceBuilder {
    /// Set the service configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector index backend.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Override the default chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RagService`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing, the
    /// configuration is invalid, or the index metric differs from the
    /// configured one.
    pub fn build(self) -> Result<RagService> {
        let config =
            self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let vector_index = self
            .vector_index
            .ok_or_else(|| RagError::Config("vector_index is required".to_string()))?;
        let generator =
            self.generator.ok_or_else(|| RagError::Config("generator is required".to_string()))?;

        if vector_index.metric() != config.metric {
            return Err(RagError::Config(format!(
                "vector index uses the {} metric but the configuration requests {}",
                vector_index.metric(),
                config.metric
            )));
        }

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?),
        };
        let gate =
            RelevanceGate::new(config.relevance_threshold).with_policy(config.gate_policy);

        Ok(RagService {
            config,
            embedding_provider,
            vector_index,
            generator,
            chunker,
            gate,
            replace_lock: Mutex::new(()),
        })
    }
}
