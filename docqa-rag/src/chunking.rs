//! Page chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits page text on the largest semantic unit that fits: paragraphs, then
//! lines, sentences, words, and finally raw characters. Adjacent small pieces
//! are merged up to `chunk_size` and the tail of each emitted chunk is carried
//! into the next one as overlap.
//!
//! All lengths are measured in characters, not bytes.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::validate_chunking;
use crate::document::{Chunk, Page};
use crate::error::Result;

/// Separators in priority order. The empty separator splits into characters.
pub const DEFAULT_SEPARATORS: [&str; 7] = ["\n\n", "\n", ". ", "! ", "? ", " ", ""];

/// A strategy for splitting pages into chunks.
///
/// Implementations must be pure: the same pages always produce the same
/// chunks, including their ids.
pub trait Chunker: Send + Sync {
    /// Split pages into chunks, in page order and then in-page order.
    ///
    /// Empty or whitespace-only pages produce no chunks.
    fn chunk(&self, pages: &[Page]) -> Vec<Chunk>;
}

/// Split `pages` with a [`RecursiveChunker`] of the given size and overlap.
///
/// # Errors
///
/// Returns [`RagError::Config`](crate::RagError::Config) if `chunk_size == 0`
/// or `chunk_overlap >= chunk_size`. Nothing is processed in that case.
pub fn chunk_pages(pages: &[Page], chunk_size: usize, chunk_overlap: usize) -> Result<Vec<Chunk>> {
    Ok(RecursiveChunker::new(chunk_size, chunk_overlap)?.chunk(pages))
}

/// Splits text recursively by paragraphs, lines, sentences, words, then characters.
///
/// Chunk ids are `{stem}_p{page}_c{seq}` where `stem` is the file stem of the
/// page source and `seq` starts at 1 for each page.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{Page, RecursiveChunker, Chunker};
///
/// let chunker = RecursiveChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&[Page::new("manual.pdf", 1, text)]);
/// assert_eq!(chunks[0].chunk_id, "manual_p1_c1");
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of characters carried between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`](crate::RagError::Config) if
    /// `chunk_size == 0` or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_chunking(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of characters carried between consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into trimmed, non-empty chunk texts.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        split_recursive(text, self.chunk_size, self.chunk_overlap, &DEFAULT_SEPARATORS)
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, pages: &[Page]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        // Keyed by (stem, page) so a repeated page or a shared stem continues
        // the sequence rather than reusing ids.
        let mut sequences: HashMap<(String, u32), usize> = HashMap::new();

        for page in pages {
            if page.content.trim().is_empty() {
                warn!(source = %page.source, page = page.page_number, "skipping empty page");
                continue;
            }

            let stem = source_stem(&page.source);
            let seq = sequences.entry((stem.to_string(), page.page_number)).or_insert(0);

            let texts = self.split_text(&page.content);
            let offsets = locate_offsets(&page.content, &texts, self.chunk_overlap);

            for (content, start_offset) in texts.into_iter().zip(offsets) {
                *seq += 1;
                chunks.push(Chunk {
                    chunk_id: format!("{stem}_p{}_c{}", page.page_number, *seq),
                    source: page.source.clone(),
                    page_number: page.page_number,
                    content,
                    start_offset,
                });
            }
        }

        debug!(pages = pages.len(), chunk_count = chunks.len(), "chunked pages");
        chunks
    }
}

/// The file stem of a source path, or the whole source if it has none.
fn source_stem(source: &str) -> &str {
    Path::new(source)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(source)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split text on the first separator it contains, recursing into pieces that
/// are still larger than `chunk_size`.
fn split_recursive(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    let position = separators.iter().position(|sep| sep.is_empty() || text.contains(sep));
    let (separator, remaining) = match position {
        Some(i) => (separators[i], &separators[i + 1..]),
        None => ("", &[][..]),
    };

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) <= chunk_size {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, chunk_size, chunk_overlap));
            pending.clear();
        }

        // Single characters always fit, so the character level never lands here.
        let next: &[&str] = if remaining.is_empty() { &[""] } else { remaining };
        chunks.extend(split_recursive(piece, chunk_size, chunk_overlap, next));
    }

    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, chunk_size, chunk_overlap));
    }

    chunks
}

/// Split text at a separator while keeping the separator attached to the
/// preceding segment. An empty separator yields individual characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }

    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Greedily merge pieces (each no longer than `chunk_size`) into chunks.
///
/// When a chunk is emitted, the trailing pieces that fit in `chunk_overlap`
/// stay in the window and start the next chunk.
fn merge_pieces(pieces: &[&str], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut merged = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0;

    for &piece in pieces {
        let len = char_len(piece);

        if total + len > chunk_size && !window.is_empty() {
            push_joined(&mut merged, &window);
            while total > chunk_overlap || (total > 0 && total + len > chunk_size) {
                match window.pop_front() {
                    Some((_, first)) => total -= first,
                    None => break,
                }
            }
        }

        window.push_back((piece, len));
        total += len;
    }

    push_joined(&mut merged, &window);
    merged
}

fn push_joined(out: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Character offsets of each chunk within `content`.
///
/// Each chunk is searched forward from the previous chunk's start plus its
/// length minus the overlap; a chunk not found there is searched from the
/// beginning of the page.
fn locate_offsets(content: &str, chunks: &[String], chunk_overlap: usize) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(chunks.len());
    let mut search_from = 0;

    for chunk in chunks {
        let found = content[search_from..]
            .find(chunk.as_str())
            .map(|pos| pos + search_from)
            .or_else(|| content.find(chunk.as_str()));

        match found {
            Some(byte_start) => {
                offsets.push(char_len(&content[..byte_start]));
                let skip = char_len(chunk).saturating_sub(chunk_overlap).max(1);
                search_from = content[byte_start..]
                    .char_indices()
                    .nth(skip)
                    .map_or(content.len(), |(i, _)| byte_start + i);
            }
            None => offsets.push(char_len(&content[..search_from])),
        }
    }

    offsets
}
