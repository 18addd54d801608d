//! End-to-end tests for `RagService` with local collaborators and test doubles.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docqa_rag::{
    AnswerGenerator, Chunk, Chunker, DistanceMetric, Document, EmbeddingProvider, ErrorKind,
    FALLBACK_DISCLAIMER, GatePolicy, HashingEmbedder, InMemoryVectorIndex, Page, RagConfig,
    RagError, RagService, Result, VectorIndex,
};

/// Records every prompt and answers with a fixed string.
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerGenerator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("generated answer".to_string())
    }

    fn name(&self) -> &str {
        "Recording"
    }
}

struct FailingGenerator;

#[async_trait]
impl AnswerGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Generation { provider: "Failing".into(), message: "quota exceeded".into() })
    }

    fn name(&self) -> &str {
        "Failing"
    }
}

/// Wraps the hashing embedder, counting calls and optionally misbehaving.
struct ScriptedEmbedder {
    inner: HashingEmbedder,
    calls: AtomicUsize,
    behaviour: Behaviour,
}

#[derive(Clone, Copy)]
enum Behaviour {
    Normal,
    Fail,
    DropLast,
    /// Succeeds on the first batch, fails every later one.
    FailAfterFirstBatch,
}

impl ScriptedEmbedder {
    fn new(behaviour: Behaviour) -> Self {
        Self { inner: HashingEmbedder::default(), calls: AtomicUsize::new(0), behaviour }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Fail => Err(RagError::Embedding {
                provider: "Scripted".into(),
                message: "connection refused".into(),
            }),
            _ => self.inner.embed(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let previous_calls = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Normal => self.inner.embed_batch(texts).await,
            Behaviour::FailAfterFirstBatch if previous_calls == 0 => {
                self.inner.embed_batch(texts).await
            }
            Behaviour::Fail | Behaviour::FailAfterFirstBatch => Err(RagError::Embedding {
                provider: "Scripted".into(),
                message: "connection refused".into(),
            }),
            Behaviour::DropLast => {
                let mut vectors = self.inner.embed_batch(texts).await?;
                vectors.pop();
                Ok(vectors)
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        "Scripted"
    }
}

struct Harness {
    service: RagService,
    index: Arc<InMemoryVectorIndex>,
    embedder: Arc<ScriptedEmbedder>,
    generator: Arc<RecordingGenerator>,
}

fn harness_with(config: RagConfig, behaviour: Behaviour, index: InMemoryVectorIndex) -> Harness {
    let index = Arc::new(index);
    let embedder = Arc::new(ScriptedEmbedder::new(behaviour));
    let generator = Arc::new(RecordingGenerator::default());
    let service = RagService::builder()
        .config(config)
        .embedding_provider(embedder.clone())
        .vector_index(index.clone())
        .generator(generator.clone())
        .build()
        .unwrap();
    Harness { service, index, embedder, generator }
}

fn harness() -> Harness {
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(0).build().unwrap();
    harness_with(config, Behaviour::Normal, InMemoryVectorIndex::default())
}

fn sky_pages() -> Vec<Page> {
    vec![Page::new("dummy.pdf", 1, "The sky is blue. The grass is green.")]
}

#[tokio::test]
async fn relevant_question_is_answered_from_context() {
    let h = harness();
    let report = h.service.ingest(&sky_pages()).await.unwrap();
    assert_eq!(report.chunks_added, 2);
    assert_eq!(report.pages_skipped, 0);

    let answer = h.service.query("What color is the sky?", None).await.unwrap();
    assert_eq!(answer.mode, "grounded");
    assert_eq!(answer.answer, "generated answer");
    assert_eq!(answer.evidence[0].id, "dummy_p1_c1");
    assert!(answer.evidence[0].distance <= 0.7);

    let prompts = h.generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("QUESTION: What color is the sky?"));
    assert!(prompts[0].contains("Source: dummy.pdf, Page: 1\n\nThe sky is blue."));
    assert!(!prompts[0].contains(FALLBACK_DISCLAIMER));
}

#[tokio::test]
async fn empty_index_falls_back_with_disclaimer() {
    let h = harness();
    let answer = h.service.query("Who wrote Hamlet?", None).await.unwrap();

    assert_eq!(answer.mode, "fallback");
    assert!(answer.evidence.is_empty());
    let prompts = h.generator.prompts();
    assert!(prompts[0].contains(FALLBACK_DISCLAIMER));
    assert!(!prompts[0].contains("CONTEXT:"));
}

#[tokio::test]
async fn unrelated_context_falls_back_but_keeps_evidence() {
    let h = harness();
    h.service
        .ingest(&[Page::new("finance.pdf", 1, "Quarterly revenue grew strongly")])
        .await
        .unwrap();

    let answer = h.service.query("What color is the sky?", None).await.unwrap();
    assert_eq!(answer.mode, "fallback");
    assert_eq!(answer.evidence.len(), 1);
    assert!(answer.evidence[0].distance > 0.7);
    assert!(h.generator.prompts()[0].contains(FALLBACK_DISCLAIMER));
}

#[tokio::test]
async fn top_k_limits_evidence() {
    let h = harness();
    h.service.ingest(&sky_pages()).await.unwrap();

    let one = h.service.query("What color is the sky?", Some(1)).await.unwrap();
    assert_eq!(one.evidence.len(), 1);

    let err = h.service.query("What color is the sky?", Some(0)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidQuery);
}

#[tokio::test]
async fn blank_query_calls_no_collaborator() {
    let h = harness();
    let err = h.service.query("   \n", None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    assert_eq!(h.embedder.calls(), 0);
    assert!(h.generator.prompts().is_empty());
}

#[tokio::test]
async fn blank_pages_are_skipped_without_touching_the_index() {
    let h = harness();
    let doc = Document::from_pages("scan.pdf", ["", "  "]);
    let report = h.service.ingest(&doc.pages).await.unwrap();

    assert_eq!(report.chunks_added, 0);
    assert_eq!(report.pages_skipped, 2);
    assert_eq!(h.embedder.calls(), 0);
    assert_eq!(h.index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn embedding_failure_commits_nothing() {
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(0).build().unwrap();
    let h = harness_with(config, Behaviour::Fail, InMemoryVectorIndex::default());

    let err = h.service.ingest(&sky_pages()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Collaborator);
    assert!(matches!(err, RagError::Embedding { .. }));
    assert_eq!(h.index.count().await.unwrap(), 0);

    let err = h.service.query("What color is the sky?", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Collaborator);
    assert!(h.generator.prompts().is_empty());
}

#[tokio::test]
async fn short_embedding_batch_is_a_collaborator_error() {
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(0).build().unwrap();
    let h = harness_with(config, Behaviour::DropLast, InMemoryVectorIndex::default());

    let err = h.service.ingest(&sky_pages()).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding { .. }));
    assert_eq!(h.index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn generation_failure_keeps_its_kind() {
    let index = Arc::new(InMemoryVectorIndex::default());
    let service = RagService::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .vector_index(index)
        .generator(Arc::new(FailingGenerator))
        .build()
        .unwrap();

    let err = service.query("What color is the sky?", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Collaborator);
    assert!(matches!(err, RagError::Generation { ref provider, .. } if provider == "Failing"));
}

#[tokio::test]
async fn failed_index_write_reports_an_index_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("index.json");
    let index = InMemoryVectorIndex::open(&path, DistanceMetric::Cosine).await.unwrap();
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(0).build().unwrap();
    let h = harness_with(config, Behaviour::Normal, index);

    let err = h.service.ingest(&sky_pages()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexWrite);
    assert_eq!(h.service.status().await.unwrap().indexed_chunks, 0);
}

#[tokio::test]
async fn status_sources_and_source_deletion() {
    let h = harness();
    h.service.ingest(&sky_pages()).await.unwrap();
    h.service.ingest(&[Page::new("b.txt", 1, "Bees make honey.")]).await.unwrap();

    let status = h.service.status().await.unwrap();
    assert_eq!(status.indexed_chunks, 3);
    assert_eq!(status.metric, DistanceMetric::Cosine);
    assert_eq!(h.service.list_sources().await.unwrap(), vec!["b.txt", "dummy.pdf"]);

    assert_eq!(h.service.delete_source("dummy.pdf").await.unwrap(), 2);
    assert_eq!(h.service.delete_source("dummy.pdf").await.unwrap(), 0);
    assert_eq!(h.service.list_sources().await.unwrap(), vec!["b.txt"]);
}

#[tokio::test]
async fn replacing_ingest_removes_only_stale_chunks() {
    let h = harness();
    h.service.ingest(&sky_pages()).await.unwrap();
    h.service.ingest(&[Page::new("b.txt", 1, "Bees make honey.")]).await.unwrap();

    let report = h
        .service
        .ingest_replacing(&[Page::new("dummy.pdf", 1, "The sky is grey.")])
        .await
        .unwrap();
    assert_eq!(report.chunks_added, 1);
    assert_eq!(report.chunks_removed, 1);

    assert_eq!(h.index.ids_for_source("dummy.pdf").await.unwrap(), vec!["dummy_p1_c1"]);
    assert_eq!(h.index.ids_for_source("b.txt").await.unwrap().len(), 1);
    let hits = h.service.retrieve("sky", 1).await.unwrap();
    assert_eq!(hits[0].content, "The sky is grey.");
}

#[tokio::test]
async fn failed_replacing_ingest_keeps_previous_chunks() {
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(0).build().unwrap();
    let h = harness_with(config, Behaviour::FailAfterFirstBatch, InMemoryVectorIndex::default());
    h.service.ingest(&sky_pages()).await.unwrap();

    let err = h
        .service
        .ingest_replacing(&[Page::new("dummy.pdf", 1, "The sky is grey.")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Collaborator);

    assert_eq!(h.index.count().await.unwrap(), 2);
    assert_eq!(
        h.index.ids_for_source("dummy.pdf").await.unwrap(),
        vec!["dummy_p1_c1", "dummy_p1_c2"]
    );
}

#[tokio::test]
async fn concurrent_replacing_ingests_leave_one_version() {
    let h = Arc::new(harness());
    h.service.ingest(&sky_pages()).await.unwrap();

    let mut tasks = Vec::new();
    for content in ["The sky is grey.", "Clouds drift. Rain falls. Wind blows."] {
        let h = Arc::clone(&h);
        tasks.push(tokio::spawn(async move {
            h.service.ingest_replacing(&[Page::new("dummy.pdf", 1, content)]).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let ids = h.index.ids_for_source("dummy.pdf").await.unwrap();
    let hits = h.service.retrieve("sky clouds rain wind", 10).await.unwrap();
    assert_eq!(hits.len(), ids.len());
    let contents: Vec<&str> = hits.iter().map(|c| c.content.as_str()).collect();
    let grey_only = contents == ["The sky is grey."];
    let clouds_only = !contents.contains(&"The sky is grey.") && ids.len() >= 2;
    assert!(grey_only || clouds_only, "mixed versions: {contents:?}");
}

/// Emits the same chunk id twice for every non-blank page.
struct DuplicatingChunker;

impl Chunker for DuplicatingChunker {
    fn chunk(&self, pages: &[Page]) -> Vec<Chunk> {
        pages
            .iter()
            .filter(|p| !p.content.trim().is_empty())
            .flat_map(|p| {
                let chunk = Chunk {
                    chunk_id: format!("dup_p{}_c1", p.page_number),
                    source: p.source.clone(),
                    page_number: p.page_number,
                    content: p.content.trim().to_string(),
                    start_offset: 0,
                };
                [chunk.clone(), chunk]
            })
            .collect()
    }
}

#[tokio::test]
async fn report_counts_committed_records_not_chunks() {
    let index = Arc::new(InMemoryVectorIndex::default());
    let service = RagService::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .vector_index(index.clone())
        .generator(Arc::new(RecordingGenerator::default()))
        .chunker(Arc::new(DuplicatingChunker))
        .build()
        .unwrap();

    let report = service.ingest(&sky_pages()).await.unwrap();
    assert_eq!(report.chunks_added, 1);
    assert_eq!(index.count().await.unwrap(), 1);
}

#[tokio::test]
async fn per_chunk_policy_narrows_the_context() {
    let config = RagConfig::builder()
        .chunk_size(20)
        .chunk_overlap(0)
        .gate_policy(GatePolicy::PerChunk)
        .build()
        .unwrap();
    let h = harness_with(config, Behaviour::Normal, InMemoryVectorIndex::default());
    h.service.ingest(&sky_pages()).await.unwrap();
    h.service
        .ingest(&[Page::new("finance.pdf", 1, "Quarterly revenue grew strongly")])
        .await
        .unwrap();

    let answer = h.service.query("What color is the sky?", None).await.unwrap();
    assert_eq!(answer.mode, "grounded");
    assert_eq!(answer.evidence.len(), 3);
    assert!(!h.generator.prompts()[0].contains("Quarterly revenue"));
}

#[test]
fn builder_requires_collaborators_and_matching_metric() {
    let err = RagService::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .vector_index(Arc::new(InMemoryVectorIndex::default()))
        .build()
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = RagService::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .vector_index(Arc::new(InMemoryVectorIndex::new(DistanceMetric::L2)))
        .generator(Arc::new(RecordingGenerator::default()))
        .build()
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
