//! Persistence for pending referrals, the referral ledger and task completions.
//!
//! Two scopes:
//! - [`PendingReferralStore`]: session-scoped, survives navigation but not restarts
//! - [`LedgerStore`]: durable identities, referral records and completions
//!
//! Every write is a single check-and-insert call. Callers never hold a value
//! read from a store across an `.await` and then write it back.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{StorageBackend, StorageConfig};
use crate::types::{Identity, ReferralRecord, TaskCompletion};

pub use memory::{MemoryLedgerStore, SessionPendingStore};
pub use sqlite::SqliteLedgerStore;

/// Error types for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store cannot be reached
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored row could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Session-scoped holder of the pending referral code.
pub trait PendingReferralStore: Send + Sync {
    /// Current pending code, if any.
    fn load(&self) -> Result<Option<String>, StoreError>;

    /// Replace the pending code.
    fn store(&self, code: &str) -> Result<(), StoreError>;

    /// Remove and return the pending code.
    fn clear(&self) -> Result<Option<String>, StoreError>;
}

/// Durable ledger storage keyed by identity.
pub trait LedgerStore: Send + Sync {
    /// Register an identity; returns false if it was already known.
    fn register_identity(&self, identity: &Identity, seen_at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Look up a known identity by address.
    ///
    /// Case-insensitive lookups that match several spellings return the
    /// earliest registered one.
    fn find_identity(&self, address: &str, case_insensitive: bool) -> Result<Option<Identity>, StoreError>;

    /// Referral record for a referred identity.
    fn referral_for(&self, referred: &Identity) -> Result<Option<ReferralRecord>, StoreError>;

    /// Insert a record; returns false if `record.referred` already has one.
    fn insert_referral(&self, record: &ReferralRecord) -> Result<bool, StoreError>;

    /// Records naming `referrer`, oldest first.
    fn referrals_by(&self, referrer: &Identity) -> Result<Vec<ReferralRecord>, StoreError>;

    /// Number of records naming `referrer`.
    fn count_referrals_by(&self, referrer: &Identity) -> Result<u64, StoreError>;

    /// Completion for one (identity, task) pair.
    fn completion(&self, identity: &Identity, task_id: &str) -> Result<Option<TaskCompletion>, StoreError>;

    /// Insert a completion; returns false if the pair was already recorded.
    fn insert_completion(&self, completion: &TaskCompletion) -> Result<bool, StoreError>;

    /// Completions for an identity, oldest first.
    fn completions_for(&self, identity: &Identity) -> Result<Vec<TaskCompletion>, StoreError>;
}

/// Open the ledger store selected in configuration.
pub fn open_ledger_store(config: &StorageConfig) -> Result<Arc<dyn LedgerStore>, StoreError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryLedgerStore::new())),
        StorageBackend::Sqlite => Ok(Arc::new(SqliteLedgerStore::open(&config.data_dir)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_memory_store() {
        let config = StorageConfig::default();
        let store = open_ledger_store(&config).unwrap();
        assert!(store
            .register_identity(&Identity::new("0xa"), Utc::now())
            .unwrap());
    }

    #[test]
    fn test_open_sqlite_store() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            data_dir: dir.path().join("ledger"),
        };
        let store = open_ledger_store(&config).unwrap();
        assert!(store
            .register_identity(&Identity::new("0xa"), Utc::now())
            .unwrap());
        assert!(dir.path().join("ledger").join(sqlite::DATABASE_FILE).exists());
    }
}
