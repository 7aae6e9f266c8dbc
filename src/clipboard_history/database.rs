//! Clipboard history database operations
//!
//! SQLite storage for clipboard entries with an FTS5 index over the text
//! fields. Connections come from an r2d2 pool; every connection runs in WAL
//! mode with a 5 second busy timeout, so a writer that meets a lock waits
//! instead of failing immediately.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, OptionalExtension, Row, ToSql, TransactionBehavior};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument};

use super::types::{ClipboardEntry, ContentType, NewEntry};
use crate::error::{HistoryError, Result};

/// File name of the history database inside the data dir.
pub const DB_FILE_NAME: &str = "history.db";
const SCHEMA_VERSION: i64 = 1;
const POOL_SIZE: u32 = 8;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_type TEXT NOT NULL,
    content_text TEXT,
    content_html TEXT,
    content_preview TEXT NOT NULL DEFAULT '',
    image_path TEXT,
    image_width INTEGER,
    image_height INTEGER,
    content_hash TEXT NOT NULL,
    content_size INTEGER NOT NULL DEFAULT 0,
    source_app TEXT,
    source_window TEXT,
    is_pinned INTEGER NOT NULL DEFAULT 0,
    is_favorite INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    last_used_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_entries_created_at ON entries(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_entries_content_type ON entries(content_type);
CREATE INDEX IF NOT EXISTS idx_entries_content_hash ON entries(content_hash);
CREATE INDEX IF NOT EXISTS idx_entries_pinned_created ON entries(is_pinned DESC, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_entries_source_app ON entries(source_app);

CREATE VIRTUAL TABLE IF NOT EXISTS entries_fts USING fts5(
    content_text,
    content_preview,
    source_window,
    content='entries',
    content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS entries_ai AFTER INSERT ON entries
WHEN new.content_type != 'image' BEGIN
    INSERT INTO entries_fts(rowid, content_text, content_preview, source_window)
    VALUES (new.id, new.content_text, new.content_preview, new.source_window);
END;

CREATE TRIGGER IF NOT EXISTS entries_ad AFTER DELETE ON entries
WHEN old.content_type != 'image' BEGIN
    INSERT INTO entries_fts(entries_fts, rowid, content_text, content_preview, source_window)
    VALUES ('delete', old.id, old.content_text, old.content_preview, old.source_window);
END;

CREATE TRIGGER IF NOT EXISTS entries_au AFTER UPDATE OF content_text, content_preview, source_window ON entries
WHEN old.content_type != 'image' BEGIN
    INSERT INTO entries_fts(entries_fts, rowid, content_text, content_preview, source_window)
    VALUES ('delete', old.id, old.content_text, old.content_preview, old.source_window);
    INSERT INTO entries_fts(rowid, content_text, content_preview, source_window)
    VALUES (new.id, new.content_text, new.content_preview, new.source_window);
END;
"#;

const ENTRY_COLUMNS: &str = "e.id, e.content_type, e.content_text, e.content_html, \
     e.content_preview, e.image_path, e.image_width, e.image_height, e.content_hash, \
     e.content_size, e.source_app, e.source_window, e.is_pinned, e.is_favorite, \
     e.created_at, e.last_used_at";

const ORDER_BY: &str = "ORDER BY e.is_pinned DESC, e.created_at DESC, e.id DESC";

impl ToSql for ContentType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ContentType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ContentType::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown content type {s:?}").into()))
    }
}

/// Filters for [`HistoryStore::search`]. Empty `text` disables full-text matching.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub content_type: Option<ContentType>,
    /// Inclusive lower bound on `created_at`, epoch ms.
    pub date_from: Option<i64>,
    /// Inclusive upper bound on `created_at`, epoch ms.
    pub date_to: Option<i64>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            content_type: None,
            date_from: None,
            date_to: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Quote user input as a single FTS5 phrase so operators are matched literally.
fn fts_phrase(query: &str) -> String {
    format!("\"{}\"", query.trim().replace('"', "\"\""))
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<ClipboardEntry> {
    Ok(ClipboardEntry {
        id: row.get(0)?,
        content_type: row.get(1)?,
        content_text: row.get(2)?,
        content_html: row.get(3)?,
        content_preview: row.get(4)?,
        image_path: row.get(5)?,
        image_width: row.get(6)?,
        image_height: row.get(7)?,
        content_hash: row.get(8)?,
        content_size: row.get::<_, i64>(9)?.max(0) as u64,
        source_app: row.get(10)?,
        source_window: row.get(11)?,
        is_pinned: row.get(12)?,
        is_favorite: row.get(13)?,
        created_at: row.get(14)?,
        last_used_at: row.get(15)?,
    })
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Handle to the history database. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct HistoryStore {
    pool: Pool<SqliteConnectionManager>,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("connections", &self.pool.state().connections)
            .finish()
    }
}

impl HistoryStore {
    /// Open or create the database at `path` and apply the schema.
    #[instrument(name = "open_history_store", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA busy_timeout=5000;
                 PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA foreign_keys=ON;",
            )
        });

        let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;
        let store = Self { pool };
        store.setup_schema()?;
        info!("Opened clipboard history database");
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        conn.execute_batch(SCHEMA)?;
        if version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            debug!(from = version, to = SCHEMA_VERSION, "Applied history schema");
        }
        Ok(())
    }

    /// Append a new row. The FTS index is updated by trigger inside the same transaction.
    pub fn insert(&self, entry: &NewEntry) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO entries (
                content_type, content_text, content_html, content_preview,
                image_path, image_width, image_height, content_hash, content_size,
                source_app, source_window, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entry.content_type(),
                entry.content_text(),
                entry.content_html(),
                entry.content_preview(),
                entry.image_path,
                entry.image_width(),
                entry.image_height(),
                entry.content_hash(),
                entry.content_size() as i64,
                entry.source_app,
                entry.source_window,
                entry.created_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(
            id,
            content_type = %entry.content_type(),
            size = entry.content_size(),
            "Stored clipboard entry"
        );
        Ok(id)
    }

    /// Pinned first, then newest first.
    pub fn get_recent(&self, limit: usize, offset: usize) -> Result<Vec<ClipboardEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries e {ORDER_BY} LIMIT ?1 OFFSET ?2"
        ))?;
        let entries = stmt
            .query_map(params![limit as i64, offset as i64], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Full-text search combined with type and date filters, ordered like `get_recent`.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<ClipboardEntry>> {
        let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM entries e");
        let mut args: Vec<Value> = Vec::new();

        if query.text.trim().is_empty() {
            sql.push_str(" WHERE 1=1");
        } else {
            sql.push_str(" JOIN entries_fts ON e.id = entries_fts.rowid WHERE entries_fts MATCH ?");
            args.push(Value::Text(fts_phrase(&query.text)));
        }
        if let Some(content_type) = query.content_type {
            sql.push_str(" AND e.content_type = ?");
            args.push(Value::Text(content_type.as_str().to_string()));
        }
        if let Some(from) = query.date_from {
            sql.push_str(" AND e.created_at >= ?");
            args.push(Value::Integer(from));
        }
        if let Some(to) = query.date_to {
            sql.push_str(" AND e.created_at <= ?");
            args.push(Value::Integer(to));
        }
        sql.push(' ');
        sql.push_str(ORDER_BY);
        sql.push_str(" LIMIT ? OFFSET ?");
        args.push(Value::Integer(query.limit as i64));
        args.push(Value::Integer(query.offset as i64));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params_from_iter(args), row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(query = %query.text, results = entries.len(), "Searched clipboard history");
        Ok(entries)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<ClipboardEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries e WHERE e.id = ?1"),
                params![id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn update_flag(&self, id: i64, column: &str, value: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            &format!("UPDATE entries SET {column} = ?1 WHERE id = ?2"),
            params![value, id],
        )?;
        if changed == 0 {
            return Err(HistoryError::NotFound(id));
        }
        debug!(id, column, value, "Updated entry flag");
        Ok(())
    }

    pub fn pin(&self, id: i64) -> Result<()> {
        self.update_flag(id, "is_pinned", true)
    }

    pub fn unpin(&self, id: i64) -> Result<()> {
        self.update_flag(id, "is_pinned", false)
    }

    pub fn set_favorite(&self, id: i64, favorite: bool) -> Result<()> {
        self.update_flag(id, "is_favorite", favorite)
    }

    pub fn update_last_used(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE entries SET last_used_at = ?1 WHERE id = ?2",
            params![now_ms(), id],
        )?;
        if changed == 0 {
            return Err(HistoryError::NotFound(id));
        }
        Ok(())
    }

    /// Delete one row regardless of its pinned state. Returns false if it did not exist.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM entries WHERE id = ?1", params![id])?;
        debug!(id, deleted, "Deleted clipboard entry");
        Ok(deleted > 0)
    }

    /// Delete every non-pinned row.
    pub fn delete_all(&self) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM entries WHERE is_pinned = 0", [])?;
        info!(deleted, "Cleared clipboard history");
        Ok(deleted)
    }

    /// True iff `hash` matches the most recently inserted row.
    pub fn is_duplicate(&self, hash: &str) -> Result<bool> {
        let conn = self.conn()?;
        let last: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM entries ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(last.as_deref() == Some(hash))
    }

    pub fn get_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Every image path referenced by a row, read in one statement.
    pub fn get_image_paths(&self) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare_cached("SELECT image_path FROM entries WHERE image_path IS NOT NULL")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(paths)
    }

    /// True iff any row still points at `image_path`.
    pub fn is_image_referenced(&self, image_path: &str) -> Result<bool> {
        let conn = self.conn()?;
        let referenced: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM entries WHERE image_path = ?1)",
            params![image_path],
            |row| row.get(0),
        )?;
        Ok(referenced)
    }

    /// Trim history to `keep_count` rows. Pinned rows always stay and count
    /// toward the total; the newest unpinned rows fill the remaining slots.
    pub fn delete_oldest(&self, keep_count: usize) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let pinned: i64 =
            tx.query_row("SELECT COUNT(*) FROM entries WHERE is_pinned = 1", [], |row| {
                row.get(0)
            })?;
        let keep_unpinned = (keep_count as i64 - pinned).max(0);
        let deleted = tx.execute(
            "DELETE FROM entries WHERE is_pinned = 0 AND id NOT IN (
                SELECT id FROM entries WHERE is_pinned = 0
                ORDER BY created_at DESC, id DESC LIMIT ?1
            )",
            params![keep_unpinned],
        )?;
        tx.commit()?;

        if deleted > 0 {
            info!(deleted, keep_count, pinned, "Evicted oldest clipboard entries");
        }
        Ok(deleted)
    }

    /// Delete non-pinned rows created before `cutoff_ms`.
    pub fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM entries WHERE is_pinned = 0 AND created_at < ?1",
            params![cutoff_ms],
        )?;
        if deleted > 0 {
            info!(deleted, cutoff_ms, "Evicted expired clipboard entries");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
#[path = "database_tests.rs"]
mod tests;
