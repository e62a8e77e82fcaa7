//! Durable item table.
//!
//! Every status mutation goes through [`ItemStore::set_status`], a single
//! conditional `UPDATE` whose `WHERE status IN (..)` clause is the
//! compare-and-swap that keeps two paths from claiming or finishing the same
//! item twice.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{Item, ItemStatus, RawItem};

const ITEM_COLUMNS: &str = "id, key, topic, title, source_name, original_excerpt, \
     image_url, enriched_summary, status, fetched_at";

#[derive(Debug, FromRow)]
struct ItemRow {
    id: i64,
    key: String,
    topic: String,
    title: String,
    source_name: String,
    original_excerpt: String,
    image_url: Option<String>,
    enriched_summary: Option<String>,
    status: String,
    fetched_at: i64,
}

impl TryFrom<ItemRow> for Item {
    type Error = Error;

    fn try_from(row: ItemRow) -> Result<Self> {
        Ok(Item {
            id: row.id,
            key: row.key,
            topic: row.topic,
            title: row.title,
            source_name: row.source_name,
            original_excerpt: row.original_excerpt,
            image_url: row.image_url,
            enriched_summary: row.enriched_summary,
            status: ItemStatus::from_str(&row.status)?,
            fetched_at: from_millis(row.fetched_at),
        })
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

fn rows_to_items(rows: Vec<ItemRow>) -> Result<Vec<Item>> {
    rows.into_iter().map(Item::try_from).collect()
}

#[derive(Clone)]
pub struct ItemStore {
    pool: SqlitePool,
}

impl ItemStore {
    /// Open (creating if needed) the database file and apply the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let newly_created = !path.exists();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Config(format!("creating {}: {e}", parent.display())))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        if newly_created {
            info!("Initialized new database: {}", path.display());
        } else {
            info!("Opened existing database: {}", path.display());
        }

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. A single pinned connection keeps the
    /// schema alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Close the pool; later calls fail with a database error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                topic TEXT NOT NULL,
                title TEXT NOT NULL,
                source_name TEXT NOT NULL,
                original_excerpt TEXT NOT NULL DEFAULT '',
                image_url TEXT,
                enriched_summary TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                fetched_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_topic ON items(topic, id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_status ON items(status, fetched_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Ingestion side
    // ------------------------------------------------------------------

    /// Insert a new pending item. Returns false when the key already exists
    /// (under any topic); the existing row is left as it was.
    pub async fn insert(&self, topic: &str, raw: &RawItem, now: DateTime<Utc>) -> Result<bool> {
        insert_with(&self.pool, topic, raw, now).await
    }

    pub async fn delete_topic(&self, topic: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM items WHERE topic = ?")
            .bind(topic)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Swap a topic's rows for a freshly fetched set in one transaction and
    /// return the new set newest-first.
    pub async fn replace_topic(
        &self,
        topic: &str,
        raws: &[RawItem],
        now: DateTime<Utc>,
    ) -> Result<Vec<Item>> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM items WHERE topic = ?")
            .bind(topic)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut inserted = 0usize;
        for raw in raws {
            if insert_with(&mut *tx, topic, raw, now).await? {
                inserted += 1;
            }
        }

        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE topic = ? ORDER BY id DESC"
        ))
        .bind(topic)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(topic, deleted, inserted, fetched = raws.len(), "topic replaced");
        rows_to_items(rows)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// All items of a topic, most recently inserted first.
    pub async fn list_topic(&self, topic: &str) -> Result<Vec<Item>> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE topic = ? ORDER BY id DESC"
        ))
        .bind(topic)
        .fetch_all(&self.pool)
        .await?;
        rows_to_items(rows)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Item>> {
        let row: Option<ItemRow> =
            sqlx::query_as(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE key = ?"))
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Item::try_from).transpose()
    }

    /// Newest `fetched_at` among the topic's items, if it has any.
    pub async fn latest_fetched_at(&self, topic: &str) -> Result<Option<DateTime<Utc>>> {
        let ms: Option<i64> = sqlx::query_scalar("SELECT MAX(fetched_at) FROM items WHERE topic = ?")
            .bind(topic)
            .fetch_one(&self.pool)
            .await?;
        Ok(ms.map(from_millis))
    }

    /// Fallback selection for the scheduler: oldest pending item, ties broken
    /// by insertion order.
    pub async fn oldest_pending(&self) -> Result<Option<Item>> {
        let row: Option<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE status = ? \
             ORDER BY fetched_at ASC, id ASC LIMIT 1"
        ))
        .bind(ItemStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Item::try_from).transpose()
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn count_by_status(&self, status: ItemStatus) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    // ------------------------------------------------------------------
    // Status machine
    // ------------------------------------------------------------------

    /// Conditionally move `key` to `new`.
    ///
    /// With `expected`, the row must currently be in that state and the edge
    /// must be legal. Without it, any legal predecessor of `new` matches.
    /// Returns false when no row matched: the item is gone or another path
    /// already moved it.
    pub async fn set_status(
        &self,
        key: &str,
        expected: Option<ItemStatus>,
        new: ItemStatus,
        summary: Option<&str>,
    ) -> Result<bool> {
        let from = match expected {
            Some(current) if !current.can_transition_to(new) => {
                return Err(Error::InvalidTransition {
                    from: current,
                    to: new,
                });
            }
            Some(current) => vec![current],
            None => ItemStatus::predecessors(new),
        };
        if new.requires_summary() && summary.is_none() {
            return Err(Error::MissingSummary(new));
        }

        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE items SET status = ?, enriched_summary = COALESCE(?, enriched_summary) \
             WHERE key = ? AND status IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql)
            .bind(new.as_str())
            .bind(summary)
            .bind(key);
        for s in &from {
            query = query.bind(s.as_str());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    /// Startup recovery: nothing can be in flight before the worker starts,
    /// so every `in_progress` row is an orphan from a previous process.
    pub async fn reset_in_progress(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE items SET status = ? WHERE status = ?")
            .bind(ItemStatus::Pending.as_str())
            .bind(ItemStatus::InProgress.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

async fn insert_with<'e, E>(exec: E, topic: &str, raw: &RawItem, now: DateTime<Utc>) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO items (
            key, topic, title, source_name, original_excerpt, image_url, status, fetched_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&raw.key)
    .bind(topic)
    .bind(&raw.title)
    .bind(&raw.source_name)
    .bind(&raw.excerpt)
    .bind(&raw.image_url)
    .bind(ItemStatus::Pending.as_str())
    .bind(to_millis(now))
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}
