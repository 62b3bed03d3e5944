//! PassageClient - entry point for rendering collaborators.
//!
//! Owns one session: the state machine, the provider subscription, referral
//! capture, the ledger and the task engine. Each client is independent, so
//! several can run side by side in one process.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::PassageConfig;
use crate::error::PassageError;
use crate::provider::{Signer, WalletProvider};
use crate::referral::{ReferralCapture, ReferralLedger};
use crate::session::SessionStateMachine;
use crate::storage::{LedgerStore, PendingReferralStore};
use crate::tasks::{TaskCatalog, TaskEngine};
use crate::types::{
    ClaimOutcome, ClientSnapshot, CommitResult, Identity, ProviderStatus, ReferralStats,
    SessionState, Transition,
};

/// Collaborators a client is assembled from.
pub struct ClientParts {
    pub provider: Arc<dyn WalletProvider>,
    pub signer: Arc<dyn Signer>,
    pub pending: Arc<dyn PendingReferralStore>,
    pub ledger_store: Arc<dyn LedgerStore>,
}

/// One client session.
pub struct PassageClient {
    provider: Arc<dyn WalletProvider>,
    signals: watch::Receiver<ProviderStatus>,
    machine: SessionStateMachine,
    capture: ReferralCapture,
    ledger: Arc<ReferralLedger>,
    tasks: TaskEngine,
    last_commit: Option<CommitResult>,
}

impl PassageClient {
    /// Build a client and derive the initial state from the provider.
    ///
    /// A session the provider restored counts as entering `Connected`, so
    /// the commit hook runs for it as well.
    pub fn new(parts: ClientParts, config: &PassageConfig) -> Result<Self, PassageError> {
        let catalog = Arc::new(TaskCatalog::new(config.tasks.iter().cloned()));
        let ledger = Arc::new(ReferralLedger::new(
            parts.ledger_store.clone(),
            catalog.clone(),
            config.referral.clone(),
        ));
        let capture = ReferralCapture::new(parts.pending, ledger.clone());
        let tasks = TaskEngine::new(catalog, parts.ledger_store, parts.signer);
        let signals = parts.provider.subscribe();

        info!(provider = parts.provider.id(), "Passage client created");

        let mut client = Self {
            provider: parts.provider,
            signals,
            machine: SessionStateMachine::new(),
            capture,
            ledger,
            tasks,
            last_commit: None,
        };

        let status = client.signals.borrow_and_update().clone();
        client.apply(&status)?;
        Ok(client)
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Identity of the live session.
    pub fn identity(&self) -> Option<&Identity> {
        self.machine.identity()
    }

    pub fn ledger(&self) -> &ReferralLedger {
        &self.ledger
    }

    /// Result of the most recent referral commit.
    pub fn last_commit(&self) -> Option<&CommitResult> {
        self.last_commit.as_ref()
    }

    /// Start a passkey login.
    ///
    /// No-op unless idle. A rejected connect returns the session to `Idle`
    /// and comes back as [`PassageError::Provider`]; the caller shows it as a
    /// notice.
    pub async fn begin_login(&mut self) -> Result<SessionState, PassageError> {
        if self.machine.begin_login().is_none() {
            return Ok(self.state());
        }

        match self.provider.connect().await {
            Ok(()) => {
                let status = self.signals.borrow_and_update().clone();
                if let Some(transition) = self.machine.connect_resolved(&status) {
                    self.on_transition(transition)?;
                }
                Ok(self.state())
            }
            Err(e) => {
                warn!(error = %e, "Wallet connect failed");
                self.machine.connect_rejected();
                let status = self.signals.borrow_and_update().clone();
                self.apply(&status)?;
                Err(PassageError::Provider(e))
            }
        }
    }

    /// Log out. Succeeds locally even when the remote teardown fails.
    pub async fn logout(&mut self) -> SessionState {
        self.machine.logout();

        if let Err(e) = self.provider.disconnect().await {
            // Best effort: the local session is gone either way.
            warn!(error = %e, "Wallet disconnect failed, session cleared locally");
        }

        let status = self.signals.borrow_and_update().clone();
        self.machine.apply_signal(&status);
        self.state()
    }

    /// Wait for the next provider status change and apply it.
    ///
    /// A provider that went away counts as disconnected.
    pub async fn observe_signal(&mut self) -> Result<Option<Transition>, PassageError> {
        let status = match self.signals.changed().await {
            Ok(()) => self.signals.borrow_and_update().clone(),
            Err(_) => {
                warn!("Wallet provider dropped its status channel");
                ProviderStatus::disconnected()
            }
        };
        self.apply(&status)
    }

    /// Apply a pending provider status change without waiting.
    pub fn poll_signals(&mut self) -> Result<Option<Transition>, PassageError> {
        if !self.signals.has_changed().unwrap_or(false) {
            return Ok(None);
        }
        let status = self.signals.borrow_and_update().clone();
        self.apply(&status)
    }

    /// Capture a referral code from the current navigation path.
    pub fn capture_from_path(&self, path: &str) -> Result<Option<String>, PassageError> {
        self.capture.capture_from_path(path)
    }

    /// Discard the pending referral code.
    pub fn expire_pending(&self) -> Result<Option<String>, PassageError> {
        self.capture.expire_pending()
    }

    /// Claim a task for the connected identity.
    pub async fn claim(&self, task_id: &str) -> Result<ClaimOutcome, PassageError> {
        let identity = self.identity().cloned().ok_or(PassageError::NotConnected)?;
        self.tasks.claim(&identity, task_id).await
    }

    /// Stats for the connected identity.
    pub fn stats(&self) -> Result<Option<ReferralStats>, PassageError> {
        self.identity()
            .map(|identity| self.ledger.stats_for(identity))
            .transpose()
    }

    /// Shareable link for the connected identity.
    pub fn referral_link(&self) -> Option<String> {
        self.identity().map(|identity| self.ledger.referral_link(identity))
    }

    /// Read-only view for rendering.
    pub fn snapshot(&self) -> Result<ClientSnapshot, PassageError> {
        let identity = self.identity().cloned();
        let tasks = match &identity {
            Some(identity) => self.tasks.tasks_for(identity)?,
            None => Vec::new(),
        };

        Ok(ClientSnapshot {
            state: self.state(),
            pending_referral: self.capture.pending()?,
            stats: self.stats()?,
            referral_link: self.referral_link(),
            tasks,
            identity,
            last_commit: self.last_commit.clone(),
        })
    }

    fn apply(&mut self, status: &ProviderStatus) -> Result<Option<Transition>, PassageError> {
        let transition = self.machine.apply_signal(status);
        if let Some(transition) = transition {
            self.on_transition(transition)?;
        }
        Ok(transition)
    }

    /// Runs after the machine has settled on `transition`.
    fn on_transition(&mut self, transition: Transition) -> Result<(), PassageError> {
        if !transition.is_login() {
            return Ok(());
        }

        let Some(identity) = self.machine.identity().cloned() else {
            warn!("Provider connected without an address, referral commit skipped");
            return Ok(());
        };

        self.ledger.register_identity(&identity)?;
        let result = self.capture.commit_pending(&identity)?;
        info!(identity = %identity, result = ?result, "Referral commit on login");
        self.last_commit = Some(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockSigner, MockWalletProvider};
    use crate::storage::{MemoryLedgerStore, SessionPendingStore};

    struct Harness {
        provider: Arc<MockWalletProvider>,
        store: Arc<MemoryLedgerStore>,
        client: PassageClient,
    }

    fn harness(provider: MockWalletProvider) -> Harness {
        let provider = Arc::new(provider);
        let store = Arc::new(MemoryLedgerStore::new());
        let client = PassageClient::new(
            ClientParts {
                provider: provider.clone(),
                signer: Arc::new(MockSigner::new()),
                pending: Arc::new(SessionPendingStore::new()),
                ledger_store: store.clone(),
            },
            &PassageConfig::default(),
        )
        .unwrap();
        Harness {
            provider,
            store,
            client,
        }
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let mut h = harness(MockWalletProvider::new("0xu1"));
        assert_eq!(h.client.state(), SessionState::Idle);

        let state = h.client.begin_login().await.unwrap();
        assert_eq!(state, SessionState::Connected);
        assert_eq!(h.client.identity(), Some(&Identity::new("0xu1")));
        assert_eq!(h.client.last_commit(), Some(&CommitResult::NoOp));

        let state = h.client.logout().await;
        assert_eq!(state, SessionState::Idle);
        assert_eq!(h.provider.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_notice() {
        let mut h = harness(MockWalletProvider::new("0xu1").with_connect_failure(true));

        let result = h.client.begin_login().await;
        assert!(matches!(result, Err(PassageError::Provider(_))));
        assert_eq!(h.client.state(), SessionState::Idle);

        h.provider.set_connect_failure(false);
        assert_eq!(h.client.begin_login().await.unwrap(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_logout_survives_disconnect_failure() {
        let mut h = harness(MockWalletProvider::new("0xu1").with_disconnect_failure(true));
        h.client.begin_login().await.unwrap();

        assert_eq!(h.client.logout().await, SessionState::Idle);
        // Provider still reports the old session; it must not come back
        assert!(h.client.poll_signals().unwrap().is_none());
        assert_eq!(h.client.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_deferred_signal_completes_login() {
        let mut h = harness(MockWalletProvider::new("0xu1").with_deferred_signals(true));

        // connect resolves but the provider has not settled
        let state = h.client.begin_login().await.unwrap();
        assert_eq!(state, SessionState::Connecting);

        h.provider.complete_connection();
        let transition = h.client.observe_signal().await.unwrap().unwrap();
        assert!(transition.is_login());
        assert_eq!(h.client.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_restored_session_registers_identity() {
        let h = harness(MockWalletProvider::new("0xu1").already_connected());
        assert_eq!(h.client.state(), SessionState::Connected);
        assert!(!h.store.register_identity(&Identity::new("0xu1"), chrono::Utc::now()).unwrap());
    }

    #[tokio::test]
    async fn test_remote_expiry() {
        let mut h = harness(MockWalletProvider::new("0xu1"));
        h.client.begin_login().await.unwrap();

        h.provider.expire_session();
        let transition = h.client.poll_signals().unwrap().unwrap();
        assert_eq!(transition.to, SessionState::Idle);
        assert_eq!(h.client.identity(), None);
    }

    #[tokio::test]
    async fn test_account_switch_commits_for_new_identity() {
        let mut h = harness(MockWalletProvider::new("U1"));
        h.store.register_identity(&Identity::new("U0"), chrono::Utc::now()).unwrap();
        h.client.begin_login().await.unwrap();
        h.client.capture_from_path("/ref/U0").unwrap();

        h.provider.emit(ProviderStatus::connected("U2"));
        let transition = h.client.poll_signals().unwrap().unwrap();
        assert!(transition.is_login());
        assert_eq!(h.client.identity(), Some(&Identity::new("U2")));

        assert!(!h.store.register_identity(&Identity::new("U2"), chrono::Utc::now()).unwrap());
        assert_eq!(
            h.client.last_commit(),
            Some(&CommitResult::Committed {
                referrer: Identity::new("U0")
            })
        );
        assert_eq!(h.client.snapshot().unwrap().pending_referral, None);
    }

    #[tokio::test]
    async fn test_provider_session_after_logout_waits_for_login() {
        let mut h = harness(MockWalletProvider::new("0xu1"));
        h.client.begin_login().await.unwrap();
        h.client.logout().await;

        // Teardown confirmed, then the wallet reconnects on its own
        h.provider.complete_connection();
        assert!(h.client.poll_signals().unwrap().is_none());
        assert_eq!(h.client.state(), SessionState::Idle);

        assert_eq!(h.client.begin_login().await.unwrap(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_claim_requires_connection() {
        let h = harness(MockWalletProvider::new("0xu1"));
        let result = h.client.claim("welcome").await;
        assert!(matches!(result, Err(PassageError::NotConnected)));
    }

    #[tokio::test]
    async fn test_snapshot() {
        let mut h = harness(MockWalletProvider::new("0xu1"));
        h.client.capture_from_path("/ref/0xnobody").unwrap();

        let idle = h.client.snapshot().unwrap();
        assert_eq!(idle.state, SessionState::Idle);
        assert_eq!(idle.pending_referral, Some("0xnobody".to_string()));
        assert!(idle.stats.is_none());
        assert!(idle.tasks.is_empty());

        h.client.begin_login().await.unwrap();
        h.client.claim("welcome").await.unwrap();

        let live = h.client.snapshot().unwrap();
        assert_eq!(live.state, SessionState::Connected);
        assert_eq!(live.pending_referral, None);
        assert_eq!(live.last_commit, Some(CommitResult::UnknownReferrer));
        assert_eq!(live.referral_link, Some("/ref/0xu1".to_string()));
        assert_eq!(live.stats.unwrap().points, 50);
        assert!(live.tasks[0].completed);
    }
}
