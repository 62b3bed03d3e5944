//! Shared types for the session and referral core.
//!
//! These are the read-only shapes handed to rendering collaborators; the
//! owning components mutate them only through their own operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Wallet address identifying an authenticated user.
///
/// The single join key across referral records and task completions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create an identity from an address, trimming surrounding whitespace.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        let trimmed = address.trim();
        if trimmed.len() == address.len() {
            Self(address)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the address is empty after trimming.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Lifecycle state shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session; login may be started
    #[default]
    Idle,
    /// Login requested, waiting for the provider to settle
    Connecting,
    /// Provider reports a live session
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Live status published by the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub is_connected: bool,
    pub is_connecting: bool,
    pub address: Option<Identity>,
}

impl ProviderStatus {
    /// Status of a provider with no session.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Status of a provider mid-ceremony.
    pub fn connecting() -> Self {
        Self {
            is_connected: false,
            is_connecting: true,
            address: None,
        }
    }

    /// Status of a provider with a live session for `address`.
    pub fn connected(address: impl Into<Identity>) -> Self {
        Self {
            is_connected: true,
            is_connecting: false,
            address: Some(address.into()),
        }
    }
}

/// A state change applied by the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

impl Transition {
    /// Whether this transition starts a connected session.
    ///
    /// `Connected -> Connected` is only produced for an account switch, which
    /// counts as a login for the new address.
    pub fn is_login(&self) -> bool {
        self.to == SessionState::Connected
    }
}

/// Attribution of a referred identity to its referrer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ReferralRecord {
    pub referred: Identity,
    pub referrer: Identity,
    pub created_at: DateTime<Utc>,
}

impl ReferralRecord {
    pub fn new(referred: Identity, referrer: Identity) -> Self {
        Self {
            referred,
            referrer,
            created_at: Utc::now(),
        }
    }
}

/// Derived referral statistics for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ReferralStats {
    pub identity: Identity,
    /// Number of identities this one referred
    pub referral_count: u64,
    /// Number of claimed tasks
    pub completed_tasks: u64,
    /// Referral points plus task points
    pub points: u64,
}

/// A claimed task, recorded once its signed action succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct TaskCompletion {
    pub identity: Identity,
    pub task_id: String,
    /// Signature returned by the sponsored signer
    pub signature: String,
    pub completed_at: DateTime<Utc>,
}

/// Outcome of committing a pending referral code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommitResult {
    /// No pending code was held
    NoOp,
    /// The identity was already attributed; pending code discarded
    AlreadyReferred,
    /// The code resolved to the identity itself; pending code discarded
    SelfReferralRejected,
    /// The code matched no known identity; pending code discarded
    UnknownReferrer,
    /// A new referral record was written
    Committed { referrer: Identity },
}

impl CommitResult {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitResult::Committed { .. })
    }
}

/// Outcome of a task claim that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// Signed and recorded
    Claimed { completion: TaskCompletion },
    /// Already recorded earlier; nothing was signed
    AlreadyClaimed,
    /// Another claim for the same task is awaiting its signature
    InProgress,
}

/// Claim status of one task for the active identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct TaskStatus {
    pub task_id: String,
    pub label: String,
    pub points: u64,
    pub completed: bool,
}

/// Read-only view consumed by renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ClientSnapshot {
    pub state: SessionState,
    pub identity: Option<Identity>,
    pub pending_referral: Option<String>,
    pub stats: Option<ReferralStats>,
    pub tasks: Vec<TaskStatus>,
    pub referral_link: Option<String>,
    pub last_commit: Option<CommitResult>,
}
