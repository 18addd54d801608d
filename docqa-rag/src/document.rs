//! Data types for pages, chunks, index records, and retrieval results.

use serde::{Deserialize, Serialize};

/// Page break used by plain-text sources (`\x0c`, form feed).
pub const PAGE_BREAK: char = '\u{000C}';

/// One page of extracted text. Produced once by an extractor and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    /// Path or name of the source document.
    pub source: String,
    /// 1-based page number within the source.
    pub page_number: u32,
    /// The extracted text of the page.
    pub content: String,
}

impl Page {
    /// Create a new page.
    pub fn new(source: impl Into<String>, page_number: u32, content: impl Into<String>) -> Self {
        Self { source: source.into(), page_number, content: content.into() }
    }
}

/// A source document: an ordered sequence of [`Page`]s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Path or name of the source document.
    pub source: String,
    /// Pages in reading order.
    pub pages: Vec<Page>,
}

impl Document {
    /// Build a document from page texts, numbering pages from 1.
    pub fn from_pages<I, S>(source: impl Into<String>, contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source = source.into();
        let pages = contents
            .into_iter()
            .zip(1u32..)
            .map(|(content, page_number)| Page::new(source.clone(), page_number, content))
            .collect();
        Self { source, pages }
    }

    /// Build a document from plain text, treating form feeds as page breaks.
    ///
    /// Text without any form feed becomes a single page.
    pub fn from_text(source: impl Into<String>, text: &str) -> Self {
        Self::from_pages(source, text.split(PAGE_BREAK))
    }
}

/// A bounded span of a page's text: the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic identifier, `"{stem}_p{page}_c{seq}"`.
    pub chunk_id: String,
    /// Source of the parent page.
    pub source: String,
    /// Page number of the parent page.
    pub page_number: u32,
    /// The chunk text.
    pub content: String,
    /// Character offset of the chunk within its page.
    pub start_offset: usize,
}

impl Chunk {
    /// The metadata stored alongside this chunk in the index.
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata { source: self.source.clone(), page_number: self.page_number }
    }
}

/// Metadata kept with every indexed record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChunkMetadata {
    /// Source of the chunk.
    pub source: String,
    /// Page number of the chunk.
    pub page_number: u32,
}

/// A chunk together with its embedding, as owned by the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// The chunk id.
    pub id: String,
    /// The embedding vector.
    pub embedding: Vec<f32>,
    /// Source and page of the chunk.
    pub metadata: ChunkMetadata,
    /// The chunk text.
    pub content: String,
}

impl VectorRecord {
    /// Pair a chunk with its embedding.
    pub fn from_chunk(chunk: Chunk, embedding: Vec<f32>) -> Self {
        let metadata = chunk.metadata();
        Self { id: chunk.chunk_id, embedding, metadata, content: chunk.content }
    }
}

/// A record returned by a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    /// The chunk id.
    pub id: String,
    /// The chunk text.
    pub content: String,
    /// Source and page of the chunk.
    pub metadata: ChunkMetadata,
    /// Distance to the query embedding (lower is more similar).
    pub distance: f32,
}

/// Query results ordered by ascending distance.
pub type RetrievalResult = Vec<RetrievedChunk>;
