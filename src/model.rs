//! Item data model and the enrichment status state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Topic used when the caller does not ask for one (the source's trending feed).
pub const DEFAULT_TOPIC: &str = "__trending__";

/// Source name recorded when a feed entry does not name its publisher.
pub const UNKNOWN_SOURCE: &str = "Unknown Source";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Done,
    Error,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 4] = [
        ItemStatus::Pending,
        ItemStatus::InProgress,
        ItemStatus::Done,
        ItemStatus::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Done => "done",
            ItemStatus::Error => "error",
        }
    }

    /// `done` and `error` have no outgoing edges.
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Error)
    }

    /// Legal edges: pending -> in_progress -> {done, error}, plus the
    /// in_progress -> pending edge used by startup recovery.
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (InProgress, Done) | (InProgress, Error) | (InProgress, Pending)
        )
    }

    /// States from which `next` may be entered.
    pub fn predecessors(next: ItemStatus) -> Vec<ItemStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// Whether entering this state must record a summary/diagnostic.
    pub fn requires_summary(self) -> bool {
        self.is_terminal()
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "in_progress" => Ok(ItemStatus::InProgress),
            "done" => Ok(ItemStatus::Done),
            "error" => Ok(ItemStatus::Error),
            other => Err(Error::UnknownStatus(other.to_string())),
        }
    }
}

/// One stored content entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: i64,
    pub key: String,
    pub topic: String,
    pub title: String,
    pub source_name: String,
    pub original_excerpt: String,
    pub image_url: Option<String>,
    pub enriched_summary: Option<String>,
    pub status: ItemStatus,
    pub fetched_at: DateTime<Utc>,
}

impl Item {
    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }
}

/// An entry as returned by an external content source, before storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub key: String,
    pub title: String,
    pub source_name: String,
    pub excerpt: String,
    pub image_url: Option<String>,
}

impl RawItem {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            source_name: UNKNOWN_SOURCE.to_string(),
            excerpt: String::new(),
            image_url: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_name = source.into();
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = excerpt.into();
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// JSON view of an item for the front end (everything but the row id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub key: String,
    pub topic: String,
    pub title: String,
    pub source_name: String,
    pub original_excerpt: String,
    pub image_url: Option<String>,
    pub enriched_summary: Option<String>,
    pub status: ItemStatus,
    pub fetched_at: DateTime<Utc>,
}

impl From<Item> for ItemView {
    fn from(it: Item) -> Self {
        Self {
            key: it.key,
            topic: it.topic,
            title: it.title,
            source_name: it.source_name,
            original_excerpt: it.original_excerpt,
            image_url: it.image_url,
            enriched_summary: it.enriched_summary,
            status: it.status,
            fetched_at: it.fetched_at,
        }
    }
}
