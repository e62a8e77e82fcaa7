//! Background enrichment: one worker picks pending items (visible ones first),
//! summarizes them and records the outcome.
//!
//! Each step is select -> claim -> enrich -> finalize. The claim is the
//! store's conditional `pending -> in_progress` update; losing it is a
//! conflict and the worker simply selects again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::hints::PriorityHints;
use crate::model::{Item, ItemStatus};
use crate::store::ItemStore;
use crate::summarize::{build_prompt, summarize_with_timeout, DynSummarizer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Pause after finishing an item.
    pub busy_delay: Duration,
    /// Pause when nothing is pending, and after a store error.
    pub idle_delay: Duration,
    /// Delay before the first selection so the server can come up first.
    pub startup_delay: Duration,
    /// Upper bound on one summarizer call.
    pub summarize_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            busy_delay: Duration::from_secs(2),
            idle_delay: Duration::from_secs(15),
            startup_delay: Duration::from_secs(10),
            summarize_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichOutcome {
    Done { summary: String },
    Failed { reason: String },
}

/// Result of one scheduler step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// An item was claimed and finalized.
    Enriched { key: String, outcome: EnrichOutcome },
    /// The selected item was claimed by someone else first.
    Conflict { key: String },
    /// Nothing pending.
    Idle,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("enrich_done_total", "Items enriched successfully.");
        describe_counter!("enrich_error_total", "Items finalized as error.");
        describe_counter!(
            "enrich_conflict_total",
            "Claims lost to a concurrent status change."
        );
        describe_histogram!("enrich_duration_ms", "Summarizer call time in milliseconds.");
    });
}

pub struct EnrichmentScheduler {
    store: ItemStore,
    hints: Arc<PriorityHints>,
    summarizer: DynSummarizer,
    cfg: SchedulerConfig,
}

impl EnrichmentScheduler {
    pub fn new(
        store: ItemStore,
        hints: Arc<PriorityHints>,
        summarizer: DynSummarizer,
        cfg: SchedulerConfig,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            hints,
            summarizer,
            cfg,
        }
    }

    /// Put items orphaned in `in_progress` by a previous process back to
    /// `pending`. Only valid while no worker is running.
    pub async fn recover(&self) -> Result<u64> {
        let n = self.store.reset_in_progress().await?;
        if n > 0 {
            info!(target: "scheduler", reset = n, "recovered in-progress items");
        }
        Ok(n)
    }

    /// Hinted items first; hints whose item is gone or no longer pending are
    /// dropped. Falls back to the oldest pending item in the store.
    async fn select(&self) -> Result<Option<Item>> {
        while let Some(key) = self.hints.pop_front() {
            match self.store.get(&key).await? {
                Some(item) if item.is_pending() => {
                    debug!(target: "scheduler", key = %item.key, "selected from hints");
                    return Ok(Some(item));
                }
                Some(item) => {
                    debug!(target: "scheduler", key = %key, status = %item.status, "skipping stale hint");
                }
                None => debug!(target: "scheduler", key = %key, "hinted item no longer stored"),
            }
        }
        self.store.oldest_pending().await
    }

    /// One select/claim/enrich/finalize step.
    pub async fn run_once(&self) -> Result<Tick> {
        let Some(item) = self.select().await? else {
            return Ok(Tick::Idle);
        };

        let claimed = self
            .store
            .set_status(&item.key, Some(ItemStatus::Pending), ItemStatus::InProgress, None)
            .await?;
        if !claimed {
            debug!(target: "scheduler", key = %item.key, "claim lost");
            counter!("enrich_conflict_total").increment(1);
            return Ok(Tick::Conflict { key: item.key });
        }

        let outcome = self.enrich(&item).await;
        let (status, text) = match &outcome {
            EnrichOutcome::Done { summary } => (ItemStatus::Done, summary.as_str()),
            EnrichOutcome::Failed { reason } => (ItemStatus::Error, reason.as_str()),
        };

        let finalized = match self
            .store
            .set_status(&item.key, Some(ItemStatus::InProgress), status, Some(text))
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                // Best effort: hand the item back instead of leaving it claimed.
                if let Err(back) = self
                    .store
                    .set_status(&item.key, Some(ItemStatus::InProgress), ItemStatus::Pending, None)
                    .await
                {
                    warn!(
                        target: "scheduler",
                        key = %item.key,
                        error = %back,
                        "handback to pending failed; item stays in_progress until restart"
                    );
                }
                return Err(e);
            }
        };
        if !finalized {
            warn!(target: "scheduler", key = %item.key, "item replaced while enriching; result dropped");
        }

        match &outcome {
            EnrichOutcome::Done { .. } => counter!("enrich_done_total").increment(1),
            EnrichOutcome::Failed { .. } => counter!("enrich_error_total").increment(1),
        }
        Ok(Tick::Enriched {
            key: item.key,
            outcome,
        })
    }

    async fn enrich(&self, item: &Item) -> EnrichOutcome {
        let prompt = build_prompt(&item.title, &item.original_excerpt);
        let t0 = Instant::now();
        let result =
            summarize_with_timeout(self.summarizer.as_ref(), &prompt, self.cfg.summarize_timeout)
                .await;
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("enrich_duration_ms").record(ms);

        match result {
            Ok(summary) => {
                info!(
                    target: "scheduler",
                    key = %item.key,
                    provider = self.summarizer.provider_name(),
                    ms = ms as u64,
                    "enriched"
                );
                EnrichOutcome::Done { summary }
            }
            Err(e) => {
                warn!(
                    target: "scheduler",
                    key = %item.key,
                    provider = self.summarizer.provider_name(),
                    error = %e,
                    "enrichment failed"
                );
                EnrichOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Recovery, startup delay, then the worker loop until `cancel` fires.
    /// Cancellation is checked between items and during pauses; a summarizer
    /// call already running is allowed to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(e) = self.recover().await {
            error!(target: "scheduler", error = %e, "startup recovery failed");
        }
        info!(
            target: "scheduler",
            provider = self.summarizer.provider_name(),
            startup_delay_ms = self.cfg.startup_delay.as_millis() as u64,
            "enrichment worker started"
        );
        if !pause(&cancel, self.cfg.startup_delay).await {
            info!(target: "scheduler", "enrichment worker stopped");
            return;
        }

        while !cancel.is_cancelled() {
            let delay = match self.run_once().await {
                Ok(Tick::Enriched { .. }) => self.cfg.busy_delay,
                Ok(Tick::Conflict { .. }) => continue,
                Ok(Tick::Idle) => self.cfg.idle_delay,
                Err(e) => {
                    error!(target: "scheduler", error = %e, "scheduler step failed");
                    self.cfg.idle_delay
                }
            };
            if !pause(&cancel, delay).await {
                break;
            }
        }
        info!(target: "scheduler", "enrichment worker stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

/// Sleep for `d`; false if cancelled first.
async fn pause(cancel: &CancellationToken, d: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawItem;
    use crate::summarize::MockSummarizer;
    use chrono::Utc;

    async fn scheduler_with(summary: &str) -> (EnrichmentScheduler, ItemStore, Arc<PriorityHints>) {
        let store = ItemStore::in_memory().await.unwrap();
        let hints = Arc::new(PriorityHints::new());
        let s = EnrichmentScheduler::new(
            store.clone(),
            Arc::clone(&hints),
            Arc::new(MockSummarizer::fixed(summary)),
            SchedulerConfig::default(),
        );
        (s, store, hints)
    }

    #[tokio::test]
    async fn empty_store_is_idle() {
        let (s, _, _) = scheduler_with("x").await;
        assert_eq!(s.run_once().await.unwrap(), Tick::Idle);
    }

    #[tokio::test]
    async fn summary_is_trimmed_and_stored() {
        let (s, store, _) = scheduler_with("  A short summary.\n").await;
        store
            .insert("t", &RawItem::new("k1", "Title"), Utc::now())
            .await
            .unwrap();

        let tick = s.run_once().await.unwrap();
        assert_eq!(
            tick,
            Tick::Enriched {
                key: "k1".into(),
                outcome: EnrichOutcome::Done {
                    summary: "A short summary.".into()
                }
            }
        );
        let item = store.get("k1").await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Done);
        assert_eq!(item.enriched_summary.as_deref(), Some("A short summary."));
    }

    #[tokio::test]
    async fn hint_for_missing_item_is_skipped() {
        let (s, store, hints) = scheduler_with("ok").await;
        store
            .insert("t", &RawItem::new("real", "Title"), Utc::now())
            .await
            .unwrap();
        hints.append(["ghost"]);

        let tick = s.run_once().await.unwrap();
        assert!(matches!(tick, Tick::Enriched { ref key, .. } if key == "real"));
        assert!(hints.is_empty());
    }
}
