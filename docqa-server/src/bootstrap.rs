//! Assemble a [`RagService`] from [`Settings`].

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use docqa_rag::{
    AnswerGenerator, Document, EmbeddingProvider, HashingEmbedder, InMemoryVectorIndex,
    RagService, VectorIndex,
};
use tracing::info;

#[cfg(any(feature = "gemini", feature = "openai"))]
use crate::settings::GeneratorKind;
use crate::settings::{EmbedderKind, IndexBackend, Settings};

/// Build the service described by `settings`.
///
/// Backends and providers compiled out of this binary are reported as errors
/// naming the missing cargo feature.
pub async fn build_service(settings: &Settings) -> anyhow::Result<RagService> {
    let index = build_index(settings).await?;
    let embedder = build_embedder(settings)?;
    let generator = build_generator(settings)?;

    info!(
        backend = index.backend(),
        embedder = embedder.name(),
        generator = generator.name(),
        metric = %settings.rag.metric,
        "assembled docqa service"
    );

    RagService::builder()
        .config(settings.rag.clone())
        .vector_index(index)
        .embedding_provider(embedder)
        .generator(generator)
        .build()
        .context("invalid service configuration")
}

async fn build_index(settings: &Settings) -> anyhow::Result<Arc<dyn VectorIndex>> {
    let metric = settings.rag.metric;
    match settings.index_backend {
        IndexBackend::Memory => {
            let index = InMemoryVectorIndex::open(&settings.index_path, metric)
                .await
                .with_context(|| format!("failed to open index {}", settings.index_path.display()))?;
            Ok(Arc::new(index))
        }
        #[cfg(feature = "qdrant")]
        IndexBackend::Qdrant => Ok(Arc::new(docqa_rag::qdrant::QdrantVectorIndex::new(
            &settings.qdrant_url,
            settings.collection.clone(),
            metric,
        )?)),
        #[cfg(feature = "pgvector")]
        IndexBackend::PgVector => {
            let Some(url) = settings.database_url.as_deref() else {
                bail!("{} must be set for the pgvector backend", crate::settings::env::DATABASE_URL);
            };
            let index =
                docqa_rag::pgvector::PgVectorIndex::connect(url, &settings.collection, metric)
                    .await?;
            Ok(Arc::new(index))
        }
        #[allow(unreachable_patterns)]
        other => bail!("docqa was built without the `{other}` feature"),
    }
}

fn build_embedder(settings: &Settings) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match settings.embedder {
        EmbedderKind::Hashing => Ok(Arc::new(HashingEmbedder::default())),
        #[cfg(feature = "openai")]
        EmbedderKind::OpenAI => {
            let mut provider = docqa_rag::openai::OpenAIEmbeddingProvider::from_env()?;
            if let Some(url) = &settings.openai_base_url {
                provider = provider.with_base_url(url);
            }
            if let Some(model) = &settings.embedding_model {
                provider = provider.with_model(model);
            }
            Ok(Arc::new(provider))
        }
        #[cfg(feature = "gemini")]
        EmbedderKind::Gemini => {
            let mut provider = docqa_rag::gemini::GeminiEmbeddingProvider::from_env()?;
            if let Some(model) = &settings.embedding_model {
                provider = provider.with_model(model);
            }
            Ok(Arc::new(provider))
        }
        #[allow(unreachable_patterns)]
        other => bail!("docqa was built without the `{other}` feature"),
    }
}

fn build_generator(settings: &Settings) -> anyhow::Result<Arc<dyn AnswerGenerator>> {
    match settings.generator {
        #[cfg(feature = "gemini")]
        GeneratorKind::Gemini => {
            let mut generator = docqa_rag::gemini::GeminiGenerator::from_env()?;
            if let Some(model) = &settings.chat_model {
                generator = generator.with_model(model);
            }
            Ok(Arc::new(generator))
        }
        #[cfg(feature = "openai")]
        GeneratorKind::OpenAI => {
            let mut generator = docqa_rag::openai::OpenAIGenerator::from_env()?;
            if let Some(url) = &settings.openai_base_url {
                generator = generator.with_base_url(url);
            }
            if let Some(model) = &settings.chat_model {
                generator = generator.with_model(model);
            }
            Ok(Arc::new(generator))
        }
        #[allow(unreachable_patterns)]
        other => bail!("docqa was built without the `{other}` feature"),
    }
}

/// Read a UTF-8 text file as a document, splitting pages on form feeds.
///
/// The source recorded for every page is the path as given.
pub async fn read_text_document(path: &Path) -> std::io::Result<Document> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(Document::from_text(path.display().to_string(), &text))
}
