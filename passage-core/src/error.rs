//! Error taxonomy for the session and referral core.
//!
//! Nothing in here is fatal to the process. Provider, referral and claim
//! failures are recovered locally; persistence failures abort the current
//! operation and are surfaced to the caller.

use serde::{Deserialize, Serialize};

use crate::provider::{ProviderError, SigningError};
use crate::storage::StoreError;

/// Why a referral could not be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReferralReason {
    /// Referrer and referred are the same identity
    SelfReferral,
    /// The referred identity already has a referrer
    AlreadyReferred,
}

impl std::fmt::Display for InvalidReferralReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::SelfReferral => "self-referral",
            Self::AlreadyReferred => "identity already referred",
        };
        f.write_str(reason)
    }
}

/// Errors surfaced by core operations.
#[derive(Debug, thiserror::Error)]
pub enum PassageError {
    /// Wallet connect/disconnect failed; the session is back at idle
    #[error("Wallet provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Referral rejected; any pending code is discarded
    #[error("Invalid referral: {0}")]
    InvalidReferral(InvalidReferralReason),

    /// Signing failed or was cancelled; the task stays unclaimed
    #[error("Task claim failed: {0}")]
    ClaimFailed(#[from] SigningError),

    /// Storage unavailable; nothing was written
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Task id not present in the catalog
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// Operation requires a connected identity
    #[error("No connected identity")]
    NotConnected,
}

impl PassageError {
    /// Whether the user can simply try the same action again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PassageError::Provider(_) | PassageError::ClaimFailed(_) | PassageError::Persistence(_)
        )
    }
}
