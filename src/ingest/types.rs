// src/ingest/types.rs
use anyhow::Result;

use crate::model::RawItem;

/// External content source: "fetch items for topic".
#[async_trait::async_trait]
pub trait ItemSource: Send + Sync {
    /// Fetch at most the source's configured maximum of items for `topic`.
    /// Transport and parse failures are returned, never swallowed.
    async fn fetch_items(&self, topic: &str) -> Result<Vec<RawItem>>;
    fn name(&self) -> &'static str;
}
