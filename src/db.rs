use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::app::transport::UserId;

#[derive(Debug, Clone)]
pub struct UsageEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub files_sequenced: u64,
    pub updated_at: String,
}

/// Lifetime per-user counters. Only written when a sequence finishes; never
/// consulted for ordering.
pub trait UsageStore {
    fn increment_sequenced_count(&self, user: UserId, display_name: &str, delta: u64)
    -> Result<()>;
    fn top_users_by_count(&self, limit: usize) -> Result<Vec<UsageEntry>>;
    fn total_user_count(&self) -> Result<u64>;
    fn all_user_ids(&self) -> Result<Vec<UserId>>;
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users_sequence (
                user_id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL,
                files_sequenced INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_sequence_count ON users_sequence(files_sequenced DESC);
            "#,
        )?;
        Ok(())
    }
}

impl UsageStore for Database {
    fn increment_sequenced_count(
        &self,
        user: UserId,
        display_name: &str,
        delta: u64,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let delta = i64::try_from(delta).context("sequenced count delta out of range")?;
        self.conn.execute(
            r#"
            INSERT INTO users_sequence (user_id, display_name, files_sequenced, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                files_sequenced = users_sequence.files_sequenced + excluded.files_sequenced,
                updated_at = excluded.updated_at
            "#,
            params![user, display_name, delta, now],
        )?;
        Ok(())
    }

    fn top_users_by_count(&self, limit: usize) -> Result<Vec<UsageEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT user_id, display_name, files_sequenced, updated_at FROM users_sequence ORDER BY files_sequenced DESC, display_name ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            let count: i64 = row.get(2)?;
            Ok(UsageEntry {
                user_id: row.get(0)?,
                display_name: row.get(1)?,
                files_sequenced: count.max(0) as u64,
                updated_at: row.get(3)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn total_user_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users_sequence", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn all_user_ids(&self) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM users_sequence ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
