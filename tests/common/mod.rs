// tests/common/mod.rs
//
// Shared stubs for integration tests: a scriptable item source and a few
// summarizers with controllable behavior.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use news_digest::freshness::{FreshnessCache, FreshnessPolicy};
use news_digest::ingest::types::ItemSource;
use news_digest::model::RawItem;
use news_digest::store::ItemStore;
use news_digest::summarize::{SummarizeError, SummarizeFuture, Summarizer};

/// Item source returning a fixed batch, counting calls and recording topics.
#[derive(Default)]
pub struct StubSource {
    items: Mutex<Vec<RawItem>>,
    topics: Mutex<Vec<String>>,
    fail: AtomicBool,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl StubSource {
    pub fn with_items(items: Vec<RawItem>) -> Arc<Self> {
        let s = Self::default();
        *s.items.lock().unwrap() = items;
        Arc::new(s)
    }

    /// `n` items keyed `{prefix}-0 .. {prefix}-{n-1}`, in that feed order.
    pub fn numbered(prefix: &str, n: usize) -> Arc<Self> {
        Self::with_items(numbered(prefix, n))
    }

    pub fn set_items(&self, items: Vec<RawItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, d: Duration) {
        *self.delay.lock().unwrap() = Some(d);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemSource for StubSource {
    async fn fetch_items(&self, topic: &str) -> anyhow::Result<Vec<RawItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.topics.lock().unwrap().push(topic.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("feed unreachable");
        }
        Ok(self.items.lock().unwrap().clone())
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

pub fn numbered(prefix: &str, n: usize) -> Vec<RawItem> {
    (0..n)
        .map(|i| {
            RawItem::new(format!("{prefix}-{i}"), format!("Headline {i}"))
                .with_source("Wire")
                .with_excerpt(format!("Body of story {i}."))
        })
        .collect()
}

pub fn policy(window_secs: i64, max_items: usize) -> FreshnessPolicy {
    FreshnessPolicy {
        window: chrono::Duration::seconds(window_secs),
        max_items,
    }
}

pub async fn cache_over(source: Arc<StubSource>, policy: FreshnessPolicy) -> (Arc<FreshnessCache>, ItemStore) {
    let store = ItemStore::in_memory().await.expect("in-memory store");
    let cache = Arc::new(FreshnessCache::new(store.clone(), source, policy));
    (cache, store)
}

/// Summarizer that sleeps before answering.
pub struct SlowSummarizer(pub Duration);

impl Summarizer for SlowSummarizer {
    fn summarize<'a>(&'a self, _prompt: &'a str) -> SummarizeFuture<'a> {
        let d = self.0;
        Box::pin(async move {
            tokio::time::sleep(d).await;
            Ok("late".to_string())
        })
    }
    fn provider_name(&self) -> &'static str {
        "slow"
    }
}

/// Summarizer that records every prompt it sees.
#[derive(Default)]
pub struct RecordingSummarizer {
    pub prompts: Mutex<Vec<String>>,
}

impl Summarizer for RecordingSummarizer {
    fn summarize<'a>(&'a self, prompt: &'a str) -> SummarizeFuture<'a> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Box::pin(async { Ok("Recorded summary.".to_string()) })
    }
    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Summarizer that deletes a topic while "thinking", as a concurrent refresh would.
pub struct TopicWipingSummarizer {
    pub store: ItemStore,
    pub topic: String,
}

impl Summarizer for TopicWipingSummarizer {
    fn summarize<'a>(&'a self, _prompt: &'a str) -> SummarizeFuture<'a> {
        Box::pin(async move {
            self.store
                .delete_topic(&self.topic)
                .await
                .map_err(|e| SummarizeError::Transport(e.to_string()))?;
            Ok("too late".to_string())
        })
    }
    fn provider_name(&self) -> &'static str {
        "wiping"
    }
}

/// Summarizer that closes the store before answering, so finalizing fails.
pub struct StoreClosingSummarizer {
    pub store: ItemStore,
}

impl Summarizer for StoreClosingSummarizer {
    fn summarize<'a>(&'a self, _prompt: &'a str) -> SummarizeFuture<'a> {
        Box::pin(async move {
            self.store.close().await;
            Ok("unsaved".to_string())
        })
    }
    fn provider_name(&self) -> &'static str {
        "closing"
    }
}
