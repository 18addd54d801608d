//! Prompt templates and assembly.

use crate::document::RetrievedChunk;
use crate::error::{RagError, Result};
use crate::gate::Mode;

/// Disclaimer the model must append verbatim to fallback answers.
pub const FALLBACK_DISCLAIMER: &str = "[Disclaimer: This information was not found in the uploaded documents and is based on general knowledge.]";

/// Template used when retrieved context is relevant.
pub const GROUNDED_TEMPLATE: &str = "\
SYSTEM: You are a helpful and precise assistant for question-answering tasks.
Use the following pieces of retrieved context to answer the question.
If you don't know the answer from the given context, just say that you don't know.
Use three sentences maximum and keep the answer concise.
Cite the source of your answer using the format [SOURCE: <source_name>, PAGE: <page_number>].

QUESTION: {question}

CONTEXT:
{context}

ANSWER:
";

/// Template used when no relevant context was found.
pub const FALLBACK_TEMPLATE: &str = "\
SYSTEM: You are a helpful assistant. The user has asked a question that could not be answered based on the provided documents.
Answer the following question using your general knowledge.
After providing the answer, you MUST include the following disclaimer on a new line:
\"{disclaimer}\"

QUESTION: {question}

ANSWER:
";

/// Separator placed between serialized context chunks.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// The input to prompt rendering, one variant per response mode.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptContext<'a> {
    /// Question plus ordered context chunks.
    Grounded {
        /// The user question, trimmed.
        question: &'a str,
        /// Context chunks in ascending-distance order.
        chunks: &'a [RetrievedChunk],
    },
    /// Question only.
    Fallback {
        /// The user question, trimmed.
        question: &'a str,
    },
}

impl<'a> PromptContext<'a> {
    /// Pair a question with the gate's decision.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidQuery`] if the question is blank.
    pub fn new(question: &'a str, mode: &'a Mode) -> Result<Self> {
        let question = validate_question(question)?;
        Ok(match mode {
            Mode::Grounded(chunks) => PromptContext::Grounded { question, chunks },
            Mode::Fallback => PromptContext::Fallback { question },
        })
    }

    /// Render the prompt text.
    pub fn render(&self) -> String {
        match self {
            PromptContext::Grounded { question, chunks } => {
                let context = format_context(chunks);
                render_template(
                    GROUNDED_TEMPLATE,
                    &[("question", *question), ("context", context.as_str())],
                )
            }
            PromptContext::Fallback { question } => render_template(
                FALLBACK_TEMPLATE,
                &[("question", *question), ("disclaimer", FALLBACK_DISCLAIMER)],
            ),
        }
    }
}

/// Assemble the prompt for `query_text` under the given mode.
///
/// # Errors
///
/// Returns [`RagError::InvalidQuery`] if `query_text` is empty or whitespace.
pub fn assemble(query_text: &str, mode: &Mode) -> Result<String> {
    Ok(PromptContext::new(query_text, mode)?.render())
}

/// Trim a question, rejecting blank input.
pub fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::InvalidQuery("query text must not be empty".to_string()));
    }
    Ok(trimmed)
}

/// Serialize chunks as labelled blocks joined by [`CONTEXT_SEPARATOR`].
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "Source: {}, Page: {}\n\n{}",
                chunk.metadata.source, chunk.metadata.page_number, chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Substitute `{name}` placeholders in one pass over the template.
///
/// Values are copied verbatim and never scanned for placeholders; unknown
/// `{...}` sequences are left as-is.
fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, value)| value.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let name = &after[..close];
            values.iter().find(|(key, _)| *key == name).map(|(_, value)| (close, *value))
        });
        match substituted {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
