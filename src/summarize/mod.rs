//! Summarization capability: provider abstraction, prompt, timeout and the
//! startup factory.

pub mod providers;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::config::ai::{AiConfig, AiProvider, FailMode};

pub use providers::{
    DisabledSummarizer, GeminiProvider, MockSummarizer, OllamaProvider, OpenAiProvider,
};

/// Why a summary could not be produced. The display text is what gets
/// recorded on an item that ends in `error`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SummarizeError {
    #[error("summarizer not configured: {0}")]
    NotConfigured(String),
    #[error("summarizer unreachable: {0}")]
    Transport(String),
    #[error("summarizer returned HTTP {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("summarizer response could not be read: {0}")]
    Malformed(String),
    #[error("summarizer returned an empty summary")]
    Empty,
    #[error("summarizer timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

pub type SummarizeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, SummarizeError>> + Send + 'a>>;

/// Single blocking "summarize(prompt) -> text" call, no streaming.
pub trait Summarizer: Send + Sync {
    fn summarize<'a>(&'a self, prompt: &'a str) -> SummarizeFuture<'a>;
    /// Provider name for diagnostics/logs.
    fn provider_name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynSummarizer = Arc<dyn Summarizer>;

/// Prompt for one item. A blank excerpt is replaced by a placeholder.
pub fn build_prompt(title: &str, excerpt: &str) -> String {
    let content = if excerpt.trim().is_empty() {
        "No content available."
    } else {
        excerpt.trim()
    };
    format!(
        "You are an expert news analyst. Summarize the following news article \
         in 2-3 concise, insightful sentences:\n\n\
         Title: {}\n\
         Content: {}",
        title.trim(),
        content
    )
}

/// Bound one call by `timeout`; expiry becomes [`SummarizeError::TimedOut`].
/// A successful but blank reply becomes [`SummarizeError::Empty`].
pub async fn summarize_with_timeout(
    summarizer: &dyn Summarizer,
    prompt: &str,
    timeout: Duration,
) -> Result<String, SummarizeError> {
    match tokio::time::timeout(timeout, summarizer.summarize(prompt)).await {
        Ok(Ok(text)) => {
            let text = text.trim();
            if text.is_empty() {
                Err(SummarizeError::Empty)
            } else {
                Ok(text.to_string())
            }
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(SummarizeError::TimedOut(timeout)),
    }
}

/// Build the configured backend.
///
/// * `mock` → deterministic [`MockSummarizer`].
/// * `disabled` → [`DisabledSummarizer`].
/// * `google` / `openai` without a key → startup error in strict mode, or a
///   disabled client (every item ends `error` with the reason) in soft mode.
pub fn build_summarizer(cfg: &AiConfig) -> anyhow::Result<DynSummarizer> {
    let model = cfg.model().to_string();
    let built: Result<DynSummarizer, String> = match cfg.provider {
        AiProvider::Mock => Ok(Arc::new(MockSummarizer::fixed(
            "Summary unavailable in mock mode; this is a deterministic placeholder.",
        ))),
        AiProvider::Disabled => Ok(Arc::new(DisabledSummarizer::new(
            "AI summaries are disabled by configuration",
        ))),
        AiProvider::Ollama => OllamaProvider::new(&cfg.host, &model)
            .map(|p| Arc::new(p) as DynSummarizer)
            .map_err(|e| format!("{e:#}")),
        AiProvider::Google | AiProvider::OpenAi => match cfg.resolved_api_key() {
            None => Err(format!(
                "missing API key for provider {:?} (set {} or ai.api_key)",
                cfg.provider,
                cfg.provider.key_env_var().unwrap_or("ai.api_key")
            )),
            Some(key) if cfg.provider == AiProvider::Google => GeminiProvider::new(key, &model)
                .map(|p| Arc::new(p) as DynSummarizer)
                .map_err(|e| format!("{e:#}")),
            Some(key) => OpenAiProvider::new(key, &model)
                .map(|p| Arc::new(p) as DynSummarizer)
                .map_err(|e| format!("{e:#}")),
        },
    };

    match (built, cfg.fail_mode) {
        (Ok(client), _) => Ok(client),
        (Err(reason), FailMode::Strict) => {
            anyhow::bail!("cannot build summarizer: {reason}")
        }
        (Err(reason), FailMode::Soft) => {
            warn!(%reason, "summarizer unavailable; items will be marked as errors");
            Ok(Arc::new(DisabledSummarizer::new(reason)))
        }
    }
}
