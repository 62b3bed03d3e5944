//! In-memory stores.
//!
//! `SessionPendingStore` is the natural home of the pending referral: it lives
//! exactly as long as the client runtime. `MemoryLedgerStore` backs tests and
//! the simulator. Both can be switched unavailable to exercise failure paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{LedgerStore, PendingReferralStore, StoreError};
use crate::types::{Identity, ReferralRecord, TaskCompletion};

/// Pending referral held for the lifetime of the client session.
pub struct SessionPendingStore {
    code: RwLock<Option<String>>,
    available: AtomicBool,
}

impl SessionPendingStore {
    pub fn new() -> Self {
        Self {
            code: RwLock::new(None),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("session storage disabled".to_string()))
        }
    }
}

impl Default for SessionPendingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingReferralStore for SessionPendingStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        self.check()?;
        let code = self
            .code
            .read()
            .map_err(|_| StoreError::Unavailable("session storage poisoned".to_string()))?;
        Ok(code.clone())
    }

    fn store(&self, code: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut slot = self
            .code
            .write()
            .map_err(|_| StoreError::Unavailable("session storage poisoned".to_string()))?;
        *slot = Some(code.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<Option<String>, StoreError> {
        self.check()?;
        let mut slot = self
            .code
            .write()
            .map_err(|_| StoreError::Unavailable("session storage poisoned".to_string()))?;
        Ok(slot.take())
    }
}

/// Ledger kept in concurrent maps.
pub struct MemoryLedgerStore {
    /// Known identities with first-seen time
    identities: DashMap<Identity, DateTime<Utc>>,
    /// Records keyed by referred identity
    referrals: DashMap<Identity, ReferralRecord>,
    /// Completions keyed by (identity, task id)
    completions: DashMap<(Identity, String), TaskCompletion>,
    available: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            identities: DashMap::new(),
            referrals: DashMap::new(),
            completions: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Total number of referral records.
    pub fn referral_count(&self) -> usize {
        self.referrals.len()
    }

    /// Total number of task completions.
    pub fn completion_count(&self) -> usize {
        self.completions.len()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("ledger storage disabled".to_string()))
        }
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn register_identity(&self, identity: &Identity, seen_at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.check()?;
        match self.identities.entry(identity.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(seen_at);
                Ok(true)
            }
        }
    }

    fn find_identity(&self, address: &str, case_insensitive: bool) -> Result<Option<Identity>, StoreError> {
        self.check()?;
        let address = address.trim();
        if !case_insensitive {
            return Ok(self
                .identities
                .get(&Identity::new(address))
                .map(|entry| entry.key().clone()));
        }

        let found = self
            .identities
            .iter()
            .filter(|entry| entry.key().as_str().eq_ignore_ascii_case(address))
            .map(|entry| (*entry.value(), entry.key().clone()))
            .min()
            .map(|(_, identity)| identity);
        Ok(found)
    }

    fn referral_for(&self, referred: &Identity) -> Result<Option<ReferralRecord>, StoreError> {
        self.check()?;
        Ok(self.referrals.get(referred).map(|r| r.clone()))
    }

    fn insert_referral(&self, record: &ReferralRecord) -> Result<bool, StoreError> {
        self.check()?;
        match self.referrals.entry(record.referred.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    fn referrals_by(&self, referrer: &Identity) -> Result<Vec<ReferralRecord>, StoreError> {
        self.check()?;
        let mut records: Vec<ReferralRecord> = self
            .referrals
            .iter()
            .filter(|r| &r.referrer == referrer)
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    fn count_referrals_by(&self, referrer: &Identity) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self
            .referrals
            .iter()
            .filter(|r| &r.referrer == referrer)
            .count() as u64)
    }

    fn completion(&self, identity: &Identity, task_id: &str) -> Result<Option<TaskCompletion>, StoreError> {
        self.check()?;
        Ok(self
            .completions
            .get(&(identity.clone(), task_id.to_string()))
            .map(|c| c.clone()))
    }

    fn insert_completion(&self, completion: &TaskCompletion) -> Result<bool, StoreError> {
        self.check()?;
        let key = (completion.identity.clone(), completion.task_id.clone());
        match self.completions.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(completion.clone());
                Ok(true)
            }
        }
    }

    fn completions_for(&self, identity: &Identity) -> Result<Vec<TaskCompletion>, StoreError> {
        self.check()?;
        let mut completions: Vec<TaskCompletion> = self
            .completions
            .iter()
            .filter(|c| &c.identity == identity)
            .map(|c| c.clone())
            .collect();
        completions.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(completions)
    }
}
