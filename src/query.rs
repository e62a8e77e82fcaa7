//! Query service: paginated reads over a topic, feeding visible pending
//! items into the priority hints.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::freshness::FreshnessCache;
use crate::hints::PriorityHints;
use crate::model::{Item, DEFAULT_TOPIC};

/// One page of a topic.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Item>,
    pub has_more: bool,
    /// Effective page number (clamped to >= 1).
    pub page: i64,
    /// Effective topic after defaulting.
    pub topic: String,
}

pub struct QueryService {
    cache: Arc<FreshnessCache>,
    hints: Arc<PriorityHints>,
    page_size: usize,
}

impl QueryService {
    pub fn new(cache: Arc<FreshnessCache>, hints: Arc<PriorityHints>, page_size: usize) -> Self {
        Self {
            cache,
            hints,
            page_size: page_size.max(1),
        }
    }

    pub fn hints(&self) -> &Arc<PriorityHints> {
        &self.hints
    }

    pub async fn get_page(&self, topic: Option<&str>, page: i64) -> Result<Page> {
        let topic = effective_topic(topic);
        let page = page.max(1);

        let resolved = self.cache.resolve(&topic).await?;
        let all = resolved.items;

        let start = (page as usize - 1).saturating_mul(self.page_size);
        let end = start.saturating_add(self.page_size);
        let has_more = end < all.len();
        let items: Vec<Item> = all
            .into_iter()
            .skip(start)
            .take(self.page_size)
            .collect();

        let pending = items.iter().filter(|it| it.is_pending()).map(|it| it.key.clone());
        let queued = if page == 1 {
            self.hints.reset_and_mark(pending)
        } else {
            self.hints.append(pending)
        };

        debug!(
            topic = %topic,
            page,
            returned = items.len(),
            has_more,
            hinted = queued,
            refreshed = resolved.refreshed,
            "page served"
        );
        Ok(Page {
            items,
            has_more,
            page,
            topic,
        })
    }
}

/// Trimmed topic, or the trending pseudo-topic when blank or absent.
pub fn effective_topic(topic: Option<&str>) -> String {
    match topic.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => DEFAULT_TOPIC.to_string(),
    }
}
