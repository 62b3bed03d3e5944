//! SQLite-backed durable ledger.
//!
//! Primary keys carry the ledger invariants: one referral record per referred
//! identity and one completion per (identity, task). Inserts use
//! `INSERT OR IGNORE` so the check and the write happen in one statement.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{LedgerStore, StoreError};
use crate::types::{Identity, ReferralRecord, TaskCompletion};

/// Database file created inside the data directory.
pub const DATABASE_FILE: &str = "passage.db";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    address TEXT PRIMARY KEY,
    first_seen_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS referrals (
    referred TEXT PRIMARY KEY,
    referrer TEXT NOT NULL,
    created_ms INTEGER NOT NULL,
    CHECK (referred <> referrer)
);
CREATE INDEX IF NOT EXISTS referrals_by_referrer ON referrals (referrer);
CREATE TABLE IF NOT EXISTS task_completions (
    identity TEXT NOT NULL,
    task_id TEXT NOT NULL,
    signature TEXT NOT NULL,
    completed_ms INTEGER NOT NULL,
    PRIMARY KEY (identity, task_id)
);
";

/// Durable ledger in a single SQLite database.
pub struct SqliteLedgerStore {
    db: Mutex<Connection>,
}

impl SqliteLedgerStore {
    /// Open or create the database under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DATABASE_FILE);
        let db = Connection::open(&db_path)?;

        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        db.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), "Ledger store initialized");

        Ok(Self { db: Mutex::new(db) })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        let db = Connection::open_in_memory()?;
        db.execute_batch(SCHEMA)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger connection poisoned".to_string()))
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", ms)))
}

fn referral_row(referred: String, referrer: String, created_ms: i64) -> Result<ReferralRecord, StoreError> {
    Ok(ReferralRecord {
        referred: Identity::new(referred),
        referrer: Identity::new(referrer),
        created_at: from_millis(created_ms)?,
    })
}

fn completion_row(
    identity: String,
    task_id: String,
    signature: String,
    completed_ms: i64,
) -> Result<TaskCompletion, StoreError> {
    Ok(TaskCompletion {
        identity: Identity::new(identity),
        task_id,
        signature,
        completed_at: from_millis(completed_ms)?,
    })
}

impl LedgerStore for SqliteLedgerStore {
    fn register_identity(&self, identity: &Identity, seen_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "INSERT OR IGNORE INTO identities (address, first_seen_ms) VALUES (?1, ?2)",
            params![identity.as_str(), seen_at.timestamp_millis()],
        )?;
        Ok(changed == 1)
    }

    fn find_identity(&self, address: &str, case_insensitive: bool) -> Result<Option<Identity>, StoreError> {
        let sql = if case_insensitive {
            "SELECT address FROM identities WHERE address = ?1 COLLATE NOCASE ORDER BY first_seen_ms, address LIMIT 1"
        } else {
            "SELECT address FROM identities WHERE address = ?1"
        };
        let found: Option<String> = self
            .conn()?
            .query_row(sql, [address.trim()], |row| row.get(0))
            .optional()?;
        Ok(found.map(Identity::new))
    }

    fn referral_for(&self, referred: &Identity) -> Result<Option<ReferralRecord>, StoreError> {
        let row: Option<(String, String, i64)> = self
            .conn()?
            .query_row(
                "SELECT referred, referrer, created_ms FROM referrals WHERE referred = ?1",
                [referred.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(|(referred, referrer, ms)| referral_row(referred, referrer, ms))
            .transpose()
    }

    fn insert_referral(&self, record: &ReferralRecord) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "INSERT OR IGNORE INTO referrals (referred, referrer, created_ms) VALUES (?1, ?2, ?3)",
            params![
                record.referred.as_str(),
                record.referrer.as_str(),
                record.created_at.timestamp_millis()
            ],
        )?;
        debug!(referred = %record.referred, inserted = changed == 1, "Referral insert");
        Ok(changed == 1)
    }

    fn referrals_by(&self, referrer: &Identity) -> Result<Vec<ReferralRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT referred, referrer, created_ms FROM referrals
             WHERE referrer = ?1 ORDER BY created_ms, referred",
        )?;
        let rows = stmt
            .query_map([referrer.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(referred, referrer, ms)| referral_row(referred, referrer, ms))
            .collect()
    }

    fn count_referrals_by(&self, referrer: &Identity) -> Result<u64, StoreError> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM referrals WHERE referrer = ?1",
            [referrer.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn completion(&self, identity: &Identity, task_id: &str) -> Result<Option<TaskCompletion>, StoreError> {
        let row: Option<(String, String, String, i64)> = self
            .conn()?
            .query_row(
                "SELECT identity, task_id, signature, completed_ms FROM task_completions
                 WHERE identity = ?1 AND task_id = ?2",
                params![identity.as_str(), task_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        row.map(|(identity, task_id, signature, ms)| completion_row(identity, task_id, signature, ms))
            .transpose()
    }

    fn insert_completion(&self, completion: &TaskCompletion) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "INSERT OR IGNORE INTO task_completions (identity, task_id, signature, completed_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                completion.identity.as_str(),
                completion.task_id,
                completion.signature,
                completion.completed_at.timestamp_millis()
            ],
        )?;
        Ok(changed == 1)
    }

    fn completions_for(&self, identity: &Identity) -> Result<Vec<TaskCompletion>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT identity, task_id, signature, completed_ms FROM task_completions
             WHERE identity = ?1 ORDER BY completed_ms, task_id",
        )?;
        let rows = stmt
            .query_map([identity.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(identity, task_id, signature, ms)| completion_row(identity, task_id, signature, ms))
            .collect()
    }
}
