//! Referral ledger: who referred whom, and the stats derived from it.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::ReferralConfig;
use crate::error::{InvalidReferralReason, PassageError};
use crate::storage::LedgerStore;
use crate::tasks::TaskCatalog;
use crate::types::{Identity, ReferralRecord, ReferralStats};

/// Durable referral attribution over a [`LedgerStore`].
///
/// Stats are recomputed from the store on every call; nothing is cached.
pub struct ReferralLedger {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<TaskCatalog>,
    config: ReferralConfig,
}

impl ReferralLedger {
    pub fn new(store: Arc<dyn LedgerStore>, catalog: Arc<TaskCatalog>, config: ReferralConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    pub fn config(&self) -> &ReferralConfig {
        &self.config
    }

    /// Record that `referred` was brought in by `referrer`.
    ///
    /// Fails with `InvalidReferral` on self-referral or when `referred`
    /// already has a referrer. The first record always wins.
    pub fn record_referral(
        &self,
        referred: &Identity,
        referrer: &Identity,
    ) -> Result<ReferralRecord, PassageError> {
        if self.same_identity(referred, referrer) {
            return Err(PassageError::InvalidReferral(InvalidReferralReason::SelfReferral));
        }

        let record = ReferralRecord::new(referred.clone(), referrer.clone());
        if !self.store.insert_referral(&record)? {
            debug!(referred = %referred, "Referral already recorded");
            return Err(PassageError::InvalidReferral(InvalidReferralReason::AlreadyReferred));
        }

        info!(referred = %referred, referrer = %referrer, "Referral recorded");
        Ok(record)
    }

    /// Referral statistics for `identity` as of now.
    pub fn stats_for(&self, identity: &Identity) -> Result<ReferralStats, PassageError> {
        let referral_count = self.store.count_referrals_by(identity)?;
        let completions = self.store.completions_for(identity)?;

        let task_points = completions
            .iter()
            .map(|c| self.catalog.points_for(&c.task_id))
            .fold(0u64, u64::saturating_add);
        let points = referral_count
            .saturating_mul(self.config.points_per_referral)
            .saturating_add(task_points);

        Ok(ReferralStats {
            identity: identity.clone(),
            referral_count,
            completed_tasks: completions.len() as u64,
            points,
        })
    }

    /// Shareable link carrying `identity` as the referral code.
    pub fn referral_link(&self, identity: &Identity) -> String {
        let prefix = self.config.path_prefix.trim_end_matches('/');
        let path = format!("{}/{}", prefix, identity);
        match &self.config.base_url {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
            None => path,
        }
    }

    /// Register an identity that reached a live session.
    pub fn register_identity(&self, identity: &Identity) -> Result<bool, PassageError> {
        let added = self.store.register_identity(identity, Utc::now())?;
        if added {
            info!(identity = %identity, "New identity registered");
        }
        Ok(added)
    }

    /// Resolve a referral code to a known identity.
    ///
    /// An exact spelling always wins, so a link resolves to the identity it
    /// was made for. Case-folded matching is only a fallback.
    pub fn resolve_code(&self, code: &str) -> Result<Option<Identity>, PassageError> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        if let Some(identity) = self.store.find_identity(code, false)? {
            return Ok(Some(identity));
        }
        if !self.config.case_insensitive_codes {
            return Ok(None);
        }
        Ok(self.store.find_identity(code, true)?)
    }

    /// Whether two identities name the same account under the configured
    /// code matching.
    pub fn same_identity(&self, a: &Identity, b: &Identity) -> bool {
        if self.config.case_insensitive_codes {
            a.as_str().eq_ignore_ascii_case(b.as_str())
        } else {
            a == b
        }
    }

    /// Referrer of `identity`, if it was referred.
    pub fn referrer_of(&self, identity: &Identity) -> Result<Option<Identity>, PassageError> {
        Ok(self.store.referral_for(identity)?.map(|r| r.referrer))
    }

    /// Identities referred by `referrer`, oldest first.
    pub fn referrals_by(&self, referrer: &Identity) -> Result<Vec<ReferralRecord>, PassageError> {
        Ok(self.store.referrals_by(referrer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLedgerStore;
    use crate::tasks::TaskDefinition;
    use crate::types::TaskCompletion;

    fn ledger() -> (ReferralLedger, Arc<MemoryLedgerStore>) {
        ledger_with(ReferralConfig::default())
    }

    fn ledger_with(config: ReferralConfig) -> (ReferralLedger, Arc<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::new());
        let catalog = Arc::new(TaskCatalog::new([TaskDefinition {
            id: "welcome".to_string(),
            label: "Welcome badge".to_string(),
            payload_template: "{task}:{identity}".to_string(),
            points: 50,
        }]));
        (
            ReferralLedger::new(store.clone(), catalog, config),
            store,
        )
    }

    #[test]
    fn test_record_and_stats() {
        let (ledger, _) = ledger();
        let u0 = Identity::new("u0");

        ledger.record_referral(&Identity::new("u1"), &u0).unwrap();
        ledger.record_referral(&Identity::new("u2"), &u0).unwrap();

        let stats = ledger.stats_for(&u0).unwrap();
        assert_eq!(stats.referral_count, 2);
        assert_eq!(stats.points, 200);
        assert_eq!(ledger.referrals_by(&u0).unwrap().len(), 2);
        assert_eq!(ledger.referrer_of(&Identity::new("u1")).unwrap(), Some(u0));
    }

    #[test]
    fn test_self_referral_rejected() {
        let (ledger, store) = ledger();
        let u1 = Identity::new("u1");

        let result = ledger.record_referral(&u1, &u1);
        assert!(matches!(
            result,
            Err(PassageError::InvalidReferral(InvalidReferralReason::SelfReferral))
        ));
        assert_eq!(store.referral_count(), 0);
    }

    #[test]
    fn test_second_referrer_rejected() {
        let (ledger, _) = ledger();
        let u1 = Identity::new("u1");

        ledger.record_referral(&u1, &Identity::new("u0")).unwrap();
        let result = ledger.record_referral(&u1, &Identity::new("u2"));
        assert!(matches!(
            result,
            Err(PassageError::InvalidReferral(InvalidReferralReason::AlreadyReferred))
        ));
        assert_eq!(ledger.referrer_of(&u1).unwrap(), Some(Identity::new("u0")));
        assert_eq!(ledger.stats_for(&Identity::new("u2")).unwrap().referral_count, 0);
    }

    #[test]
    fn test_stats_include_task_points() {
        let (ledger, store) = ledger();
        let u0 = Identity::new("u0");

        ledger.record_referral(&Identity::new("u1"), &u0).unwrap();
        store
            .insert_completion(&TaskCompletion {
                identity: u0.clone(),
                task_id: "welcome".to_string(),
                signature: "0xsig".to_string(),
                completed_at: Utc::now(),
            })
            .unwrap();

        let stats = ledger.stats_for(&u0).unwrap();
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.points, 150);
    }

    #[test]
    fn test_referral_link() {
        let (ledger, _) = ledger();
        assert_eq!(ledger.referral_link(&Identity::new("0xabc")), "/ref/0xabc");

        let store = Arc::new(MemoryLedgerStore::new());
        let config = ReferralConfig {
            base_url: Some("https://passage.example/".to_string()),
            ..Default::default()
        };
        let linked = ReferralLedger::new(store, Arc::new(TaskCatalog::default()), config);
        assert_eq!(
            linked.referral_link(&Identity::new("0xabc")),
            "https://passage.example/ref/0xabc"
        );
    }

    #[test]
    fn test_resolve_code() {
        let (ledger, _) = ledger();
        ledger.register_identity(&Identity::new("0xAbC")).unwrap();

        assert_eq!(
            ledger.resolve_code(" 0xAbC ").unwrap(),
            Some(Identity::new("0xAbC"))
        );
        // Exact matching by default: addresses may be case-sensitive
        assert_eq!(ledger.resolve_code("0xabc").unwrap(), None);
        assert_eq!(ledger.resolve_code("0xdef").unwrap(), None);
        assert_eq!(ledger.resolve_code("").unwrap(), None);
    }

    #[test]
    fn test_resolve_code_case_folding_fallback() {
        let (ledger, _) = ledger_with(ReferralConfig {
            case_insensitive_codes: true,
            ..Default::default()
        });
        ledger.register_identity(&Identity::new("0xAbC")).unwrap();

        assert_eq!(
            ledger.resolve_code("0xabc").unwrap(),
            Some(Identity::new("0xAbC"))
        );
        assert!(ledger.same_identity(&Identity::new("0xabc"), &Identity::new("0xAbC")));
    }

    #[test]
    fn test_link_resolves_to_its_owner() {
        for case_insensitive_codes in [false, true] {
            let (ledger, _) = ledger_with(ReferralConfig {
                case_insensitive_codes,
                ..Default::default()
            });
            let owners = [Identity::new("abc"), Identity::new("ABC"), Identity::new("aBc")];
            for owner in &owners {
                ledger.register_identity(owner).unwrap();
            }

            for owner in &owners {
                let link = ledger.referral_link(owner);
                let code = crate::referral::parse_referral_code("/ref/", &link).unwrap();
                assert_eq!(ledger.resolve_code(&code).unwrap().as_ref(), Some(owner));
            }
        }
    }

    #[test]
    fn test_case_folded_self_referral_rejected() {
        let (ledger, store) = ledger_with(ReferralConfig {
            case_insensitive_codes: true,
            ..Default::default()
        });

        let result = ledger.record_referral(&Identity::new("0xabc"), &Identity::new("0xAbC"));
        assert!(matches!(
            result,
            Err(PassageError::InvalidReferral(InvalidReferralReason::SelfReferral))
        ));
        assert_eq!(store.referral_count(), 0);
    }

    #[test]
    fn test_persistence_error_surfaces() {
        let (ledger, store) = ledger();
        store.set_available(false);

        let result = ledger.record_referral(&Identity::new("u1"), &Identity::new("u0"));
        assert!(matches!(result, Err(PassageError::Persistence(_))));
    }
}
