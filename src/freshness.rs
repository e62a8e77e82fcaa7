//! Freshness cache controller: decides per topic whether stored items are
//! served as-is or replaced by a fresh fetch.
//!
//! The "detect stale -> fetch -> replace" sequence runs under a per-topic
//! async lock, and the staleness check is repeated once the lock is held, so
//! concurrent readers of the same stale topic trigger a single fetch. The
//! fetch happens before anything is deleted; a failed fetch leaves the old
//! snapshot in place.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ingest::{clean_batch, types::ItemSource};
use crate::model::Item;
use crate::store::ItemStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Age after which a topic snapshot must be refetched.
    pub window: Duration,
    /// Cap on items taken from one fetch.
    pub max_items: usize,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            window: Duration::seconds(900),
            max_items: 30,
        }
    }
}

impl FreshnessPolicy {
    /// A topic is stale when it has no items, or its newest item is older
    /// than the window.
    pub fn is_stale(&self, latest_fetch: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match latest_fetch {
            None => true,
            Some(ts) => now - ts > self.window,
        }
    }
}

/// Outcome of resolving a topic.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Items newest-first.
    pub items: Vec<Item>,
    /// True when this call fetched from the source.
    pub refreshed: bool,
}

pub struct FreshnessCache {
    store: ItemStore,
    source: Arc<dyn ItemSource>,
    policy: FreshnessPolicy,
    topic_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FreshnessCache {
    pub fn new(store: ItemStore, source: Arc<dyn ItemSource>, policy: FreshnessPolicy) -> Self {
        Self {
            store,
            source,
            policy,
            topic_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_stale(&self, topic: &str) -> Result<bool> {
        self.is_stale_at(topic, Utc::now()).await
    }

    pub async fn is_stale_at(&self, topic: &str, now: DateTime<Utc>) -> Result<bool> {
        let latest = self.store.latest_fetched_at(topic).await?;
        Ok(self.policy.is_stale(latest, now))
    }

    pub async fn resolve(&self, topic: &str) -> Result<Resolved> {
        self.resolve_at(topic, Utc::now()).await
    }

    /// Serve the topic's items, refetching first if the snapshot is stale.
    pub async fn resolve_at(&self, topic: &str, now: DateTime<Utc>) -> Result<Resolved> {
        if !self.is_stale_at(topic, now).await? {
            return self.cached(topic).await;
        }

        let lock = self.topic_lock(topic);
        let _guard = lock.lock().await;

        // Another reader may have refreshed while we waited.
        if !self.is_stale_at(topic, now).await? {
            return self.cached(topic).await;
        }
        self.refresh(topic, now).await
    }

    async fn cached(&self, topic: &str) -> Result<Resolved> {
        debug!(target: "cache", topic, "cache hit (fresh)");
        counter!("cache_hits_total").increment(1);
        let items = self.store.list_topic(topic).await?;
        Ok(Resolved {
            items,
            refreshed: false,
        })
    }

    async fn refresh(&self, topic: &str, now: DateTime<Utc>) -> Result<Resolved> {
        info!(target: "cache", topic, source = self.source.name(), "cache miss/expired, fetching");
        counter!("cache_refresh_total").increment(1);

        let raws = match self.source.fetch_items(topic).await {
            Ok(raws) => raws,
            Err(e) => {
                warn!(target: "cache", topic, error = %format!("{e:#}"), "fetch failed; keeping cached items");
                return Err(Error::ingestion(topic, &e));
            }
        };
        let fetched = raws.len();
        let raws = clean_batch(raws, self.policy.max_items);
        if raws.is_empty() {
            // Nothing to replace with; the topic stays stale and is retried.
            let items = self.store.list_topic(topic).await?;
            warn!(
                target: "cache",
                topic,
                fetched,
                cached = items.len(),
                "fetch returned no usable items; keeping cached items"
            );
            return Ok(Resolved {
                items,
                refreshed: false,
            });
        }

        let items = self.store.replace_topic(topic, &raws, now).await?;
        info!(
            target: "cache",
            topic,
            fetched,
            kept = raws.len(),
            stored = items.len(),
            "topic refreshed"
        );
        Ok(Resolved {
            items,
            refreshed: true,
        })
    }

    fn topic_lock(&self, topic: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = match self.topic_locks.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        Arc::clone(map.entry(topic.to_string()).or_default())
    }
}
