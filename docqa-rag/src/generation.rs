//! Answer generator trait: an assembled prompt in, free text out.

use async_trait::async_trait;

use crate::error::Result;

/// A language model that turns an assembled prompt into an answer.
///
/// The call is a single request/response from the caller's point of view.
/// Retries, timeouts, and cancellation are the implementation's concern;
/// failures must be returned as [`RagError::Generation`](crate::RagError::Generation).
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::gemini::GeminiGenerator;
///
/// let generator = GeminiGenerator::from_env()?;
/// let answer = generator.generate(&prompt).await?;
/// ```
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate an answer for the given prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// A short generator name used in errors and logs.
    fn name(&self) -> &str;
}
