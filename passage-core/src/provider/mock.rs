//! Mock wallet provider and signer for testing.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};

use super::traits::*;
use crate::types::{Identity, ProviderStatus};

/// Mock wallet provider.
///
/// Connects instantly as a fixed address unless configured to fail or to
/// defer the connected signal until the test emits it.
pub struct MockWalletProvider {
    provider_id: String,
    address: Identity,
    status: watch::Sender<ProviderStatus>,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
    deferred: AtomicBool,
    connect_calls: AtomicU32,
    disconnect_calls: AtomicU32,
}

impl MockWalletProvider {
    /// Create a disconnected mock that logs in as `address`.
    pub fn new(address: impl Into<Identity>) -> Self {
        let (status, _) = watch::channel(ProviderStatus::disconnected());
        Self {
            provider_id: "mock-wallet".to_string(),
            address: address.into(),
            status,
            fail_connect: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            deferred: AtomicBool::new(false),
            connect_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
        }
    }

    /// Start with a live session already restored.
    pub fn already_connected(self) -> Self {
        self.status.send_replace(ProviderStatus::connected(self.address.clone()));
        self
    }

    /// Make `connect` reject.
    pub fn with_connect_failure(self, fail: bool) -> Self {
        self.set_connect_failure(fail);
        self
    }

    /// Make `disconnect` fail without tearing the session down.
    pub fn with_disconnect_failure(self, fail: bool) -> Self {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
        self
    }

    /// Let `connect` resolve while the status stays at connecting.
    pub fn with_deferred_signals(self, deferred: bool) -> Self {
        self.deferred.store(deferred, Ordering::SeqCst);
        self
    }

    pub fn set_connect_failure(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Address this mock logs in as.
    pub fn address(&self) -> &Identity {
        &self.address
    }

    /// Publish an arbitrary status.
    pub fn emit(&self, status: ProviderStatus) {
        self.status.send_replace(status);
    }

    /// Publish the connected status for the configured address.
    pub fn complete_connection(&self) {
        self.emit(ProviderStatus::connected(self.address.clone()));
    }

    /// Simulate a remote session expiry.
    pub fn expire_session(&self) {
        self.emit(ProviderStatus::disconnected());
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockWalletProvider {
    fn default() -> Self {
        Self::new("0xmock")
    }
}

#[async_trait]
impl WalletProvider for MockWalletProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    async fn connect(&self) -> Result<(), ProviderError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.emit(ProviderStatus::connecting());

        if self.fail_connect.load(Ordering::SeqCst) {
            self.emit(ProviderStatus::disconnected());
            return Err(ProviderError::Rejected("Mock passkey rejected".to_string()));
        }

        if !self.deferred.load(Ordering::SeqCst) {
            self.complete_connection();
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(ProviderError::DisconnectFailed(
                "Mock teardown failed".to_string(),
            ));
        }

        self.emit(ProviderStatus::disconnected());
        Ok(())
    }

    fn status(&self) -> ProviderStatus {
        self.status.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<ProviderStatus> {
        self.status.subscribe()
    }
}

/// Mock sponsored signer.
///
/// Signs with a SHA-256 digest of the message and counts requests.
pub struct MockSigner {
    fail: AtomicBool,
    cancel: AtomicBool,
    gate: Option<Arc<Notify>>,
    call_count: AtomicU32,
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            gate: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Reject every payload.
    pub fn with_failure(self, fail: bool) -> Self {
        self.set_failure(fail);
        self
    }

    /// Report the user dismissing every prompt.
    pub fn with_cancel(self, cancel: bool) -> Self {
        self.cancel.store(cancel, Ordering::SeqCst);
        self
    }

    /// Hold each signature until the gate is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_failure(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of sign requests received.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Signer for MockSigner {
    async fn sign(&self, payload: SigningPayload) -> Result<SignatureResult, SigningError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.cancel.load(Ordering::SeqCst) {
            return Err(SigningError::Cancelled);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SigningError::Rejected("Mock signer disabled".to_string()));
        }

        let digest = Sha256::digest(payload.message.as_bytes());
        Ok(SignatureResult {
            request_id: payload.request_id,
            signature: format!("0x{}", hex::encode(digest)),
            user_fee: 0,
        })
    }
}
