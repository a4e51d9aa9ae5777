//! Gist generation.
//!
//! A gist is a <= 280 character one-sentence summary used by the context
//! packer. Short content is summarised inline through the LLM adapter with
//! a fallback on failure; long content returns the fallback immediately and
//! queues asynchronous generation, delivering the improved gist through a
//! fire-and-forget callback with no cross-submission ordering guarantee.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::runtime::LlmAdapter;

/// Maximum gist length in characters
pub const MAX_GIST_CHARS: usize = 280;

/// Content at or below this length is summarised inline
const INLINE_GIST_MAX_CHARS: usize = 2000;

/// Completion budget for gist prompts
const GIST_MAX_TOKENS: usize = 128;

const GIST_PROMPT: &str = "Compress the following into one sentence of at most 280 characters. \
Keep names, numbers, and outcomes. Reply with the sentence only.\n\n";

/// Truncation fallback: content unchanged when it fits, else the first 277
/// characters plus an ellipsis.
pub fn fallback_gist(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= MAX_GIST_CHARS {
        return content.to_string();
    }
    let mut gist: String = chars[..MAX_GIST_CHARS - 3].iter().collect();
    gist.push_str("...");
    gist
}

/// Callback invoked with an asynchronously generated gist
pub type AsyncGistCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Gist generation service backed by the optional LLM adapter and a bounded
/// worker pool for long-content submissions.
pub struct GistService {
    llm: Option<Arc<dyn LlmAdapter>>,
    limiter: Arc<Semaphore>,
}

impl GistService {
    /// Create a service; `workers` bounds concurrent async generations
    pub fn new(llm: Option<Arc<dyn LlmAdapter>>, workers: usize) -> Self {
        Self {
            llm,
            limiter: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Produce a gist for `content`.
    ///
    /// Returns synchronously in every case. For content above the inline
    /// threshold the return value is the truncation fallback and
    /// `on_async_gist` fires later if LLM generation succeeds.
    pub async fn gist(&self, content: &str, on_async_gist: Option<AsyncGistCallback>) -> String {
        let Some(llm) = self.llm.clone() else {
            return fallback_gist(content);
        };

        if content.chars().count() <= INLINE_GIST_MAX_CHARS {
            let prompt = format!("{}{}", GIST_PROMPT, content);
            return match llm.generate(&prompt, GIST_MAX_TOKENS).await {
                Ok(text) => clamp_gist(&text),
                Err(e) => {
                    tracing::warn!("inline gist generation failed, using fallback: {}", e);
                    fallback_gist(content)
                }
            };
        }

        // Long content: fallback now, queue the real generation.
        let fallback = fallback_gist(content);
        if let Some(callback) = on_async_gist {
            let prompt = format!("{}{}", GIST_PROMPT, content);
            let limiter = self.limiter.clone();
            tokio::spawn(async move {
                let Ok(_permit) = limiter.acquire().await else {
                    return;
                };
                match llm.generate(&prompt, GIST_MAX_TOKENS).await {
                    Ok(text) => callback(clamp_gist(&text)),
                    Err(e) => {
                        // The fallback gist is already committed; drop the error.
                        tracing::warn!("async gist generation failed: {}", e);
                    }
                }
            });
        }
        fallback
    }
}

fn clamp_gist(text: &str) -> String {
    fallback_gist(text.trim())
}

// ============================================================================
// TESTS
// ============================================================================
