//! Common error types for the digest service.

use thiserror::Error;

use crate::model::ItemStatus;

/// Common result type for store, cache and query operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// External content source failed; the topic's cached rows are untouched.
    #[error("Ingestion failed for topic '{topic}': {reason}")]
    Ingestion { topic: String, reason: String },

    /// A status update that would leave the enrichment state machine.
    #[error("Invalid status transition {from} -> {to}")]
    InvalidTransition { from: ItemStatus, to: ItemStatus },

    /// `done` and `error` must always carry a summary or diagnostic.
    #[error("Status {0} requires a summary")]
    MissingSummary(ItemStatus),

    /// A status column value that is not one of the four known states.
    #[error("Unknown item status: {0}")]
    UnknownStatus(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn ingestion(topic: &str, err: &anyhow::Error) -> Self {
        Error::Ingestion {
            topic: topic.to_string(),
            reason: format!("{err:#}"),
        }
    }

    /// True for failures the caller may retry by simply asking again.
    pub fn is_ingestion(&self) -> bool {
        matches!(self, Error::Ingestion { .. })
    }
}
