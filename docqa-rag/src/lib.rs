//! # docqa-rag
//!
//! Retrieval-and-fallback question answering over a private document
//! collection.
//!
//! ## Overview
//!
//! Pages go in through [`RagService::ingest`]: they are split into
//! overlapping chunks, embedded, and stored in a [`VectorIndex`].
//! [`RagService::query`] embeds the question, retrieves the nearest chunks,
//! and lets a [`RelevanceGate`] decide between two modes:
//!
//! - **grounded**: the best chunk is close enough, so the answer is
//!   generated from the retrieved context with page citations;
//! - **fallback**: nothing relevant was found, so the answer comes from
//!   general knowledge and carries a fixed disclaimer.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{Document, HashingEmbedder, InMemoryVectorIndex, RagConfig, RagService};
//!
//! let service = RagService::builder()
//!     .config(RagConfig::from_env()?)
//!     .embedding_provider(Arc::new(HashingEmbedder::default()))
//!     .vector_index(Arc::new(InMemoryVectorIndex::default()))
//!     .generator(Arc::new(my_generator))
//!     .build()?;
//!
//! let doc = Document::from_text("notes.txt", "The sky is blue.\x0cThe grass is green.");
//! service.ingest(&doc.pages).await?;
//! let answer = service.query("What color is the sky?", None).await?;
//! println!("[{}] {}", answer.mode, answer.answer);
//! ```
//!
//! ## Features
//!
//! | Feature | Adds |
//! |---------|------|
//! | `openai` | [`openai::OpenAIEmbeddingProvider`], [`openai::OpenAIGenerator`] |
//! | `gemini` | [`gemini::GeminiEmbeddingProvider`], [`gemini::GeminiGenerator`] |
//! | `qdrant` | [`qdrant::QdrantVectorIndex`] |
//! | `pgvector` | [`pgvector::PgVectorIndex`] |
//! | `full` | all of the above |

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod gate;
pub mod generation;
pub mod hashing;
pub mod inmemory;
pub mod pipeline;
pub mod prompt;
pub mod vectorstore;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pgvector")]
pub mod pgvector;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use chunking::{Chunker, RecursiveChunker, chunk_pages};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, ChunkMetadata, Document, Page, RetrievalResult, RetrievedChunk, VectorRecord,
};
pub use embedding::EmbeddingProvider;
pub use error::{ErrorKind, RagError, Result};
pub use gate::{GatePolicy, Mode, RelevanceGate};
pub use generation::AnswerGenerator;
pub use hashing::HashingEmbedder;
pub use inmemory::InMemoryVectorIndex;
pub use pipeline::{IndexStatus, IngestReport, QueryAnswer, RagService, RagServiceBuilder};
pub use prompt::{FALLBACK_DISCLAIMER, PromptContext, assemble};
pub use vectorstore::{DistanceMetric, VectorIndex};
