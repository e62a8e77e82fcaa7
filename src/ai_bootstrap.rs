// src/ai_bootstrap.rs
use std::time::Duration;

use tracing::{info, warn};

use crate::summarize::{summarize_with_timeout, DynSummarizer};

const PROBE_PROMPT: &str = "Reply with the single word: ready";

/// One-off startup call so a local model gets loaded before the first real
/// item, and so a misconfigured backend shows up in the logs early. Never
/// fails; the outcome is only logged.
pub async fn warm_up(summarizer: DynSummarizer, timeout: Duration) {
    let provider = summarizer.provider_name();
    if provider == "disabled" {
        warn!(provider, "AI warm-up skipped: summarizer is disabled");
        return;
    }
    match summarize_with_timeout(summarizer.as_ref(), PROBE_PROMPT, timeout).await {
        Ok(reply) => info!(provider, reply_len = reply.len(), "AI warm-up ok"),
        Err(e) => warn!(provider, error = %e, "AI warm-up failed"),
    }
}
