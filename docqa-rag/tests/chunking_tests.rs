//! Integration and property tests for the recursive chunker.

use std::collections::HashSet;

use docqa_rag::chunking::{Chunker, RecursiveChunker, chunk_pages};
use docqa_rag::document::{Document, Page};
use docqa_rag::error::ErrorKind;
use proptest::prelude::*;

fn page(source: &str, number: u32, content: &str) -> Page {
    Page::new(source, number, content)
}

#[test]
fn two_sentences_split_into_two_chunks() {
    let pages = [page("dummy.pdf", 1, "The sky is blue. The grass is green.")];
    let chunks = chunk_pages(&pages, 20, 0).unwrap();

    let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(texts, vec!["The sky is blue.", "The grass is green."]);
    assert_eq!(chunks[0].chunk_id, "dummy_p1_c1");
    assert_eq!(chunks[1].chunk_id, "dummy_p1_c2");
    assert_eq!(chunks[0].start_offset, 0);
    assert_eq!(chunks[1].start_offset, 17);
    assert!(chunks.iter().all(|c| c.source == "dummy.pdf" && c.page_number == 1));
}

#[test]
fn short_page_is_a_single_chunk() {
    let pages = [page("reports/q3.pdf", 4, "  Revenue grew.  ")];
    let chunks = chunk_pages(&pages, 1000, 200).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk_id, "q3_p4_c1");
    assert_eq!(chunks[0].content, "Revenue grew.");
    assert_eq!(chunks[0].start_offset, 2);
}

#[test]
fn word_level_overlap_carries_trailing_words() {
    let pages = [page("w.txt", 1, "one two three four five six")];
    let chunks = chunk_pages(&pages, 10, 5).unwrap();
    let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(texts, vec!["one two", "two three", "four five", "five six"]);
}

#[test]
fn paragraphs_are_preferred_over_sentences() {
    let text = "First paragraph here.\n\nSecond paragraph. Still second.";
    let chunks = chunk_pages(&[page("p.txt", 1, text)], 40, 0).unwrap();
    let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(texts, vec!["First paragraph here.", "Second paragraph. Still second."]);
}

#[test]
fn multibyte_text_is_measured_in_characters() {
    let text = "日".repeat(25);
    let chunks = chunk_pages(&[page("ja.txt", 1, &text)], 10, 0).unwrap();
    let lens: Vec<usize> = chunks.iter().map(|c| c.content.chars().count()).collect();
    assert_eq!(lens, vec![10, 10, 5]);
    assert_eq!(chunks[2].start_offset, 20);
}

#[test]
fn blank_pages_produce_no_chunks_and_keep_page_numbers() {
    let doc = Document::from_pages("mixed.pdf", ["Intro text.", "   \n\t", "", "Closing text."]);
    let chunks = chunk_pages(&doc.pages, 100, 10).unwrap();

    let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["mixed_p1_c1", "mixed_p4_c1"]);
    assert!(chunk_pages(&[page("empty.pdf", 1, " ")], 100, 10).unwrap().is_empty());
    assert!(chunk_pages(&[], 100, 10).unwrap().is_empty());
}

#[test]
fn repeated_stem_and_page_continue_the_sequence() {
    let pages = [page("a/report.pdf", 1, "Alpha."), page("b/report.txt", 1, "Beta.")];
    let chunks = chunk_pages(&pages, 100, 0).unwrap();
    let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["report_p1_c1", "report_p1_c2"]);
}

#[test]
fn form_feed_text_keeps_page_boundaries() {
    let doc = Document::from_text("book.txt", "Page one text.\x0cPage two text.");
    let chunks = chunk_pages(&doc.pages, 1000, 0).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].page_number, 2);
    assert_eq!(chunks[1].content, "Page two text.");
}

#[test]
fn invalid_parameters_are_configuration_errors() {
    let pages = [page("a.pdf", 1, "text")];
    for (size, overlap) in [(0, 0), (10, 10), (10, 11)] {
        let err = chunk_pages(&pages, size, overlap).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
    assert!(RecursiveChunker::new(10, 9).is_ok());
}

fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => "[a-zA-Zé日]{1,12}",
            2 => Just(" ".to_string()),
            1 => Just(". ".to_string()),
            1 => Just("\n".to_string()),
            1 => Just("\n\n".to_string()),
        ],
        0..80,
    )
    .prop_map(|parts| parts.concat())
}

/// Chunks respect the size bound, are substrings of their page found at the
/// reported offset, carry unique ids, and come out identical on a second run.
mod prop_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_are_bounded_located_unique_and_deterministic(
            contents in proptest::collection::vec(arb_text(), 1..4),
            chunk_size in 1usize..60,
            overlap_ratio in 0.0f64..1.0,
        ) {
            let chunk_overlap = ((chunk_size as f64) * overlap_ratio) as usize;
            prop_assume!(chunk_overlap < chunk_size);

            let doc = Document::from_pages("prop.pdf", contents);
            let chunker = RecursiveChunker::new(chunk_size, chunk_overlap).unwrap();
            let chunks = chunker.chunk(&doc.pages);

            let mut ids = HashSet::new();
            for chunk in &chunks {
                prop_assert!(chunk.content.chars().count() <= chunk_size);
                prop_assert!(!chunk.content.trim().is_empty());
                prop_assert!(ids.insert(chunk.chunk_id.clone()), "duplicate id {}", chunk.chunk_id);

                let page = &doc.pages[(chunk.page_number - 1) as usize];
                let located: String = page.content.chars().skip(chunk.start_offset).collect();
                prop_assert!(located.starts_with(&chunk.content));
            }

            prop_assert_eq!(chunks, chunker.chunk(&doc.pages));
        }
    }
}
