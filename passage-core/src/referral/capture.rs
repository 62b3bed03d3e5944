//! Referral capture from navigation paths.
//!
//! A code seen in `/ref/<code>` waits in session storage until a session
//! resolves, then is committed into the ledger at most once.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::ledger::ReferralLedger;
use crate::error::{InvalidReferralReason, PassageError};
use crate::storage::PendingReferralStore;
use crate::types::{CommitResult, Identity};

/// Extract the referral code from `path` under `prefix`.
///
/// Query string and fragment are ignored, as is anything after the first
/// segment following the prefix.
pub fn parse_referral_code(prefix: &str, path: &str) -> Option<String> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
    let code = rest.split('/').next().unwrap_or_default().trim();

    let valid = !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    valid.then(|| code.to_string())
}

/// Holds and commits pending referral codes.
pub struct ReferralCapture {
    pending: Arc<dyn PendingReferralStore>,
    ledger: Arc<ReferralLedger>,
}

impl ReferralCapture {
    pub fn new(pending: Arc<dyn PendingReferralStore>, ledger: Arc<ReferralLedger>) -> Self {
        Self { pending, ledger }
    }

    /// Capture a code from `path`, replacing any earlier pending code.
    ///
    /// Paths without a code leave storage untouched.
    pub fn capture_from_path(&self, path: &str) -> Result<Option<String>, PassageError> {
        let Some(code) = parse_referral_code(&self.ledger.config().path_prefix, path) else {
            return Ok(None);
        };

        self.pending.store(&code)?;
        info!(code = %code, "Referral code captured");
        Ok(Some(code))
    }

    /// Currently pending code.
    pub fn pending(&self) -> Result<Option<String>, PassageError> {
        Ok(self.pending.load()?)
    }

    /// Drop the pending code without committing it.
    pub fn expire_pending(&self) -> Result<Option<String>, PassageError> {
        let expired = self.pending.clear()?;
        if let Some(code) = &expired {
            debug!(code = %code, "Pending referral expired");
        }
        Ok(expired)
    }

    /// Commit the pending code for a freshly connected `identity`.
    ///
    /// Safe to call repeatedly: a committed code is cleared at once and a
    /// referred identity never takes a second referrer.
    pub fn commit_pending(&self, identity: &Identity) -> Result<CommitResult, PassageError> {
        let Some(code) = self.pending.load()? else {
            return Ok(CommitResult::NoOp);
        };

        if self.ledger.referrer_of(identity)?.is_some() {
            self.pending.clear()?;
            debug!(identity = %identity, code = %code, "Returning user, pending referral discarded");
            return Ok(CommitResult::AlreadyReferred);
        }

        let Some(referrer) = self.ledger.resolve_code(&code)? else {
            self.pending.clear()?;
            warn!(identity = %identity, code = %code, "Referral code matches no identity, discarded");
            return Ok(CommitResult::UnknownReferrer);
        };

        if self.ledger.same_identity(&referrer, identity) {
            self.pending.clear()?;
            warn!(identity = %identity, "Self-referral discarded");
            return Ok(CommitResult::SelfReferralRejected);
        }

        match self.ledger.record_referral(identity, &referrer) {
            Ok(_) => {
                self.pending.clear()?;
                Ok(CommitResult::Committed { referrer })
            }
            Err(PassageError::InvalidReferral(InvalidReferralReason::AlreadyReferred)) => {
                self.pending.clear()?;
                Ok(CommitResult::AlreadyReferred)
            }
            Err(PassageError::InvalidReferral(InvalidReferralReason::SelfReferral)) => {
                self.pending.clear()?;
                Ok(CommitResult::SelfReferralRejected)
            }
            Err(e) => Err(e),
        }
    }
}
