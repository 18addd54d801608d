//! Gemini embedding provider and answer generator over the REST API.
//!
//! Requests authenticate with the `x-goog-api-key` header and target
//! `models/{model}:embedContent`, `:batchEmbedContents`, and
//! `:generateContent`.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::AnswerGenerator;

/// Environment variables checked, in order, for the API key.
pub const API_KEY_ENVS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// The default Generative Language API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER: &str = "Gemini";
const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 3072;
const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

/// Embedding task hint sent with each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Text that will be stored and searched.
    RetrievalDocument,
    /// A search query.
    RetrievalQuery,
    /// Symmetric similarity.
    SemanticSimilarity,
}

/// Shared HTTP plumbing for both Gemini types.
#[derive(Clone)]
struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    fn new(api_key: &str, model: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(RagError::Config("Gemini API key must not be empty".into()));
        }
        let value = HeaderValue::from_str(api_key)
            .map_err(|e| RagError::Config(format!("invalid Gemini API key: {e}")))?;
        let headers = HeaderMap::from_iter([(HeaderName::from_static("x-goog-api-key"), value)]);
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, base_url: DEFAULT_BASE_URL.into(), model: model.into() })
    }

    fn model_path(&self) -> String {
        format!("models/{}", self.model)
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}:{method}", self.base_url.trim_end_matches('/'), self.model_path())
    }

    async fn post_json<B, R>(
        &self,
        method: &str,
        body: &B,
        to_error: impl Fn(String) -> RagError,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self.http.post(self.url(method)).json(body).send().await.map_err(|e| {
            error!(provider = PROVIDER, method, error = %e, "request failed");
            to_error(format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let description = response.text().await.unwrap_or_default();
            error!(provider = PROVIDER, method, %status, "API error");
            return Err(to_error(format!("API returned {status}: {description}")));
        }

        response.json().await.map_err(|e| {
            error!(provider = PROVIDER, method, error = %e, "failed to parse response");
            to_error(format!("failed to parse response: {e}"))
        })
    }
}

fn read_api_key() -> Result<String> {
    API_KEY_ENVS.iter().find_map(|name| std::env::var(name).ok()).ok_or_else(|| {
        RagError::Config(format!("set {} or {} to use Gemini", API_KEY_ENVS[0], API_KEY_ENVS[1]))
    })
}

fn embedding_error(message: String) -> RagError {
    RagError::Embedding { provider: PROVIDER.into(), message }
}

fn generation_error(message: String) -> RagError {
    RagError::Generation { provider: PROVIDER.into(), message }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: [Part<'a>; 1],
}

impl<'a> Content<'a> {
    fn text(role: Option<&'a str>, text: &'a str) -> Self {
        Self { role, parts: [Part { text }] }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    content: Content<'a>,
    task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct BatchEmbedContentsRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedContentsResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// # Configuration
///
/// - Single embeddings (queries) use [`TaskType::RetrievalQuery`]; batches
///   (ingestion) use [`TaskType::RetrievalDocument`]. Override both with
///   [`GeminiEmbeddingProvider::with_task_type`].
/// - `output_dimensionality` – optional truncation of the output vector.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::from_env()?.with_output_dimensionality(768);
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct GeminiEmbeddingProvider {
    client: GeminiClient,
    task_override: Option<TaskType>,
    output_dimensionality: Option<usize>,
    dimensions: usize,
}

impl GeminiEmbeddingProvider {
    /// Create a provider using the given API key and `gemini-embedding-001`.
    pub fn new(api_key: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            client: GeminiClient::new(api_key.as_ref(), DEFAULT_EMBEDDING_MODEL)?,
            task_override: None,
            output_dimensionality: None,
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        })
    }

    /// Create a provider from `GOOGLE_API_KEY` or `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::new(read_api_key()?)
    }

    /// Use a different embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.client.model = model.into();
        self
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client.base_url = base_url.into();
        self
    }

    /// Use one task type for both queries and documents.
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_override = Some(task_type);
        self
    }

    /// Set the output dimensionality (truncates the embedding vector).
    pub fn with_output_dimensionality(mut self, dims: usize) -> Self {
        self.output_dimensionality = Some(dims);
        self.dimensions = dims;
        self
    }

    fn request<'a>(
        &self,
        model: Option<&'a str>,
        text: &'a str,
        task_type: TaskType,
    ) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model,
            content: Content::text(None, text),
            task_type: self.task_override.unwrap_or(task_type),
            output_dimensionality: self.output_dimensionality,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");
        let request = self.request(None, text, TaskType::RetrievalQuery);
        let response: EmbedContentResponse =
            self.client.post_json("embedContent", &request, embedding_error).await?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");

        let model = self.client.model_path();
        let request = BatchEmbedContentsRequest {
            requests: texts
                .iter()
                .map(|text| self.request(Some(&model), text, TaskType::RetrievalDocument))
                .collect(),
        };
        let response: BatchEmbedContentsResponse =
            self.client.post_json("batchEmbedContents", &request, embedding_error).await?;
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// An [`AnswerGenerator`] backed by Gemini `generateContent`.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::gemini::GeminiGenerator;
///
/// let generator = GeminiGenerator::from_env()?;
/// let answer = generator.generate(&prompt).await?;
/// ```
pub struct GeminiGenerator {
    client: GeminiClient,
}

impl GeminiGenerator {
    /// Create a generator using the given API key and `gemini-2.5-flash`.
    pub fn new(api_key: impl AsRef<str>) -> Result<Self> {
        Ok(Self { client: GeminiClient::new(api_key.as_ref(), DEFAULT_CHAT_MODEL)? })
    }

    /// Create a generator from `GOOGLE_API_KEY` or `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::new(read_api_key()?)
    }

    /// Use a different model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.client.model = model.into();
        self
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.client.model, prompt_len = prompt.len(), "generating answer");

        let request = GenerateContentRequest { contents: [Content::text(Some("user"), prompt)] };
        let response: GenerateContentResponse =
            self.client.post_json("generateContent", &request, generation_error).await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(generation_error("response contained no text".into()));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
