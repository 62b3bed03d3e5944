//! Seams to the external wallet and signing services.
//!
//! The passkey ceremony, the smart wallet and the paymaster all live behind
//! these two traits. The core only reacts to what they report.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::types::{Identity, ProviderStatus};

/// Error types for wallet provider operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The user or the authenticator rejected the ceremony
    #[error("Connection rejected: {0}")]
    Rejected(String),

    /// The user dismissed the passkey prompt
    #[error("Connection cancelled")]
    Cancelled,

    /// Provider is not reachable
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Remote session teardown failed
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(String),
}

/// Error types for sponsored signing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SigningError {
    /// The user declined to sign
    #[error("Signature cancelled")]
    Cancelled,

    /// The signer refused the payload
    #[error("Signature rejected: {0}")]
    Rejected(String),

    /// Gas sponsorship was not granted
    #[error("Sponsorship unavailable: {0}")]
    SponsorUnavailable(String),

    /// Signer not reachable
    #[error("Signer unavailable: {0}")]
    Unavailable(String),
}

/// Wallet provider offering passkey login.
///
/// `connect` and `disconnect` only initiate provider work. The session state
/// is derived from the status channel returned by `subscribe`, which always
/// holds the latest status.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Provider identifier, for logs.
    fn id(&self) -> &str;

    /// Start the passkey ceremony.
    async fn connect(&self) -> Result<(), ProviderError>;

    /// Tear down the remote session.
    async fn disconnect(&self) -> Result<(), ProviderError>;

    /// Current status.
    fn status(&self) -> ProviderStatus;

    /// Watch status changes.
    fn subscribe(&self) -> watch::Receiver<ProviderStatus>;
}

/// Payload submitted for a sponsored signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPayload {
    /// Unique request id
    pub request_id: String,
    pub identity: Identity,
    pub task_id: String,
    /// Rendered message to sign
    pub message: String,
    /// Fees are paid by the sponsor
    pub sponsored: bool,
}

impl SigningPayload {
    pub fn new(identity: Identity, task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            identity,
            task_id: task_id.into(),
            message: message.into(),
            sponsored: true,
        }
    }
}

/// Result of a successful signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResult {
    pub request_id: String,
    pub signature: String,
    /// Fee charged to the user, zero when sponsored
    pub user_fee: u64,
}

/// Sponsored signing capability.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, payload: SigningPayload) -> Result<SignatureResult, SigningError>;
}
