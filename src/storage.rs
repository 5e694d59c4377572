//! `SQLite` state store for the cached social graph.
//!
//! Holds the point-in-time Following and Followers snapshots, the
//! append-only unfollow history, and the run log. Snapshot replacement and
//! per-account unfollow marking are transactional, so a crash mid-batch
//! leaves every account either fully processed or untouched.

use crate::error::{PruneError, Result};
use crate::model::{
    Account, GraphStats, RunMode, RunRecord, RunStatus, UnfollowReason, UnfollowRecord,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use tracing::info;

const SCHEMA_VERSION: i32 = 1;

const LAST_SYNC_KEY: &str = "last_synced_at";

fn parse_rfc3339_or_epoch(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map_or_else(
        |_| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default(),
        |dt| dt.with_timezone(&Utc),
    )
}

/// `SQLite` storage manager.
pub struct Storage {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`PruneError::DatabaseLocked`] when another process holds the
    /// store, or a database error if it cannot be opened or migrated.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path).map_err(|e| lock_aware(&path, e))?;

        // Pragmas for durability and single-writer operation
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(|e| lock_aware(&path, e))?;

        let storage = Self {
            conn,
            path: Some(path),
        };
        storage.migrate()?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let storage = Self { conn, path: None };
        storage.migrate()?;
        Ok(storage)
    }

    /// Run database migrations.
    fn migrate(&self) -> Result<()> {
        let current_version = self.get_schema_version();

        if current_version < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current_version, SCHEMA_VERSION
            );
            self.create_schema()?;
            self.set_schema_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn get_schema_version(&self) -> i32 {
        let result: std::result::Result<i32, _> = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                let value: String = row.get(0)?;
                Ok(value.parse().unwrap_or(0))
            },
        );

        // Treat a missing meta table as version 0.
        result.unwrap_or_default()
    }

    fn set_schema_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![version.to_string()],
        )?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            -- Metadata table
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Accounts the acting user follows, as of the last sync
            CREATE TABLE IF NOT EXISTS following (
                login TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_following_first_seen ON following(first_seen);

            -- Accounts following the acting user, as of the last sync
            CREATE TABLE IF NOT EXISTS followers (
                login TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL
            );

            -- Append-only unfollow history
            CREATE TABLE IF NOT EXISTS unfollowed (
                login TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                unfollowed_at TEXT NOT NULL,
                reason TEXT NOT NULL DEFAULT 'not-following-back'
            );

            -- One row per invocation
            CREATE TABLE IF NOT EXISTS run_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                mode TEXT NOT NULL,
                attempted INTEGER NOT NULL DEFAULT 0,
                succeeded INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                details TEXT
            );
            ",
        )?;

        Ok(())
    }

    /// Replace the Following snapshot with a freshly synced one.
    ///
    /// Runs as a single transaction: every account is upserted (keeping its
    /// original `first_seen`), then rows absent from the new snapshot are
    /// pruned. Either the whole snapshot lands or none of it does.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement in the transaction fails.
    pub fn replace_following(&mut self, accounts: &[Account], seen_at: DateTime<Utc>) -> Result<usize> {
        self.replace_set("following", accounts, seen_at)
    }

    /// Replace the Followers snapshot. Same all-or-nothing contract as
    /// [`Storage::replace_following`].
    ///
    /// # Errors
    ///
    /// Returns an error if any statement in the transaction fails.
    pub fn replace_followers(&mut self, accounts: &[Account], seen_at: DateTime<Utc>) -> Result<usize> {
        self.replace_set("followers", accounts, seen_at)
    }

    fn replace_set(
        &mut self,
        table: &'static str,
        accounts: &[Account],
        seen_at: DateTime<Utc>,
    ) -> Result<usize> {
        let seen = seen_at.to_rfc3339();
        let tx = self.conn.transaction()?;

        {
            let mut upsert = tx.prepare_cached(&format!(
                "INSERT INTO {table} (login, user_id, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(login) DO UPDATE SET
                     user_id = excluded.user_id,
                     last_seen = excluded.last_seen"
            ))?;
            for account in accounts {
                upsert.execute(params![account.login, account.user_id, seen])?;
            }
        }

        // Anything not touched by this sync has left the set.
        tx.execute(
            &format!("DELETE FROM {table} WHERE last_seen <> ?1"),
            params![seen],
        )?;

        tx.commit()?;
        info!("Updated {} snapshot with {} accounts", table, accounts.len());
        Ok(accounts.len())
    }

    /// The ordered candidate set: Following minus Followers minus
    /// Unfollowed, oldest unreciprocated follow first. Login breaks ties so
    /// the ordering is reproducible across runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn candidates(&self) -> Result<Vec<Account>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT f.login, f.user_id, f.first_seen, f.last_seen
             FROM following f
             LEFT JOIN followers fo ON f.login = fo.login
             LEFT JOIN unfollowed u ON f.login = u.login
             WHERE fo.login IS NULL
               AND u.login IS NULL
             ORDER BY f.first_seen ASC, f.login ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(Account {
                login: row.get(0)?,
                user_id: row.get(1)?,
                first_seen: parse_rfc3339_or_epoch(&row.get::<_, String>(2)?),
                last_seen: parse_rfc3339_or_epoch(&row.get::<_, String>(3)?),
            })
        })?;

        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Atomically mark one account as unfollowed: remove it from Following
    /// and append it to the history in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if either statement fails; neither change is kept.
    pub fn mark_unfollowed(
        &mut self,
        account: &Account,
        reason: UnfollowReason,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM following WHERE login = ?1",
            params![account.login],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO unfollowed (login, user_id, unfollowed_at, reason)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                account.login,
                account.user_id,
                at.to_rfc3339(),
                reason.as_str()
            ],
        )?;
        tx.commit()?;
        info!(login = %account.login, reason = %reason, "Marked as unfollowed");
        Ok(())
    }

    /// Whether a login is recorded in the unfollow history.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn is_unfollowed(&self, login: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM unfollowed WHERE login = ?1",
                params![login],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// The most recent unfollow-history entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent_unfollows(&self, limit: usize) -> Result<Vec<UnfollowRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT login, user_id, unfollowed_at, reason
             FROM unfollowed ORDER BY unfollowed_at DESC, login ASC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            let reason: String = row.get(3)?;
            Ok(UnfollowRecord {
                login: row.get(0)?,
                user_id: row.get(1)?,
                unfollowed_at: parse_rfc3339_or_epoch(&row.get::<_, String>(2)?),
                reason: reason.parse().unwrap_or(UnfollowReason::NotFollowingBack),
            })
        })?;

        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Append one invocation summary to the run log.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn record_run(&self, record: &RunRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO run_log (started_at, mode, attempted, succeeded, failed, skipped, status, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.started_at.to_rfc3339(),
                record.mode.as_str(),
                record.attempted,
                record.succeeded,
                record.failed,
                record.skipped,
                record.status.as_str(),
                record.details,
            ],
        )?;
        Ok(())
    }

    /// The most recent run-log entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT started_at, mode, attempted, succeeded, failed, skipped, status, details
             FROM run_log ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            let mode: String = row.get(1)?;
            let status: String = row.get(6)?;
            Ok(RunRecord {
                started_at: parse_rfc3339_or_epoch(&row.get::<_, String>(0)?),
                mode: mode.parse().unwrap_or(RunMode::Sync),
                attempted: row.get(2)?,
                succeeded: row.get(3)?,
                failed: row.get(4)?,
                skipped: row.get(5)?,
                status: status.parse().unwrap_or(RunStatus::Failed),
                details: row.get(7)?,
            })
        })?;

        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Aggregate counts over the stored graph.
    ///
    /// # Errors
    ///
    /// Returns an error if any count query fails.
    pub fn stats(&self) -> Result<GraphStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };

        Ok(GraphStats {
            following: count("SELECT COUNT(*) FROM following")?,
            followers: count("SELECT COUNT(*) FROM followers")?,
            unfollowed: count("SELECT COUNT(*) FROM unfollowed")?,
            candidates: count(
                "SELECT COUNT(*)
                 FROM following f
                 LEFT JOIN followers fo ON f.login = fo.login
                 LEFT JOIN unfollowed u ON f.login = u.login
                 WHERE fo.login IS NULL AND u.login IS NULL",
            )?,
            last_synced_at: self.last_synced_at()?,
        })
    }

    /// When the last fully successful sync finished, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![LAST_SYNC_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.as_deref().map(parse_rfc3339_or_epoch))
    }

    /// Record the completion time of a fully successful sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn set_last_synced_at(&self, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![LAST_SYNC_KEY, at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// All logins currently in the Following snapshot, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn following_logins(&self) -> Result<Vec<String>> {
        self.logins("following")
    }

    /// All logins currently in the Followers snapshot, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn followers_logins(&self) -> Result<Vec<String>> {
        self.logins("followers")
    }

    fn logins(&self, table: &'static str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT login FROM {table} ORDER BY login"))?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// The path this store was opened from, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn lock_aware(path: &Path, err: rusqlite::Error) -> PruneError {
    match err {
        rusqlite::Error::SqliteFailure(code, _)
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            PruneError::DatabaseLocked {
                path: path.to_path_buf(),
            }
        }
        other => PruneError::Database(other),
    }
}
