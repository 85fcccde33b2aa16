use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::StoreResult;

/// How long a statement waits on another writer before reporting a conflict.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Open (or create) the database file and make sure the schema exists
    pub fn new<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests and throwaway tooling
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self { conn };
        db.init_schema()?;

        info!("Database initialized");
        Ok(db)
    }

    /// Create all tables and indexes
    fn init_schema(&self) -> StoreResult<()> {
        // Category forest; parent links are validated by the store, not by triggers
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                parent_id INTEGER REFERENCES categories(id),
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Articles belong to exactly one category. No ON DELETE CASCADE: the
        // category delete path removes them explicitly.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                category_id INTEGER NOT NULL REFERENCES categories(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS article_tags (
                article_id INTEGER NOT NULL REFERENCES articles(id),
                tag_id INTEGER NOT NULL REFERENCES tags(id),
                PRIMARY KEY (article_id, tag_id)
            )",
            [],
        )?;

        // Indexes for performance
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_articles_created ON articles(created_at DESC)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_article_tags_tag ON article_tags(tag_id)",
            [],
        )?;

        debug!("Schema ready");
        Ok(())
    }

    /// Start a write transaction that takes the database write lock up front.
    ///
    /// Validation reads and the following writes then see one consistent
    /// graph; a competing writer gets `SQLITE_BUSY` instead of interleaving.
    pub(crate) fn write_transaction(&mut self) -> StoreResult<rusqlite::Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    pub fn count_categories(&self) -> StoreResult<usize> {
        self.count_rows("categories")
    }

    pub fn count_articles(&self) -> StoreResult<usize> {
        self.count_rows("articles")
    }

    pub fn count_tags(&self) -> StoreResult<usize> {
        self.count_rows("tags")
    }

    pub fn count_article_tags(&self) -> StoreResult<usize> {
        self.count_rows("article_tags")
    }

    fn count_rows(&self, table: &'static str) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Fixed-width RFC3339 timestamp, so text ordering matches time ordering
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Does a row with this id exist in `table`?
pub(crate) fn row_exists(conn: &Connection, table: &'static str, id: i64) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1", table),
            [id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
