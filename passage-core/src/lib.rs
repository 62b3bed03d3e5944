//! Passage - passkey session and referral attribution core
//!
//! Coordinates a passkey wallet login with referral tracking:
//! - Signal-driven session state machine over an external wallet provider
//! - Referral capture from `/ref/<code>` links, committed once per new user
//! - Durable referral ledger with derived stats and shareable links
//! - One-time claimable tasks backed by sponsored signatures
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 PassageClient                   │
//! │   (begin_login / logout / claim / snapshot)     │
//! └───────┬──────────────┬──────────────┬───────────┘
//!         │              │              │
//!         ▼              ▼              ▼
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ SessionState │ │  Referral    │ │  TaskEngine  │
//! │   Machine    │ │  Capture     │ │              │
//! └──────┬───────┘ └──────┬───────┘ └──────┬───────┘
//!        │                ▼                │
//!        │         ┌──────────────┐        │
//!        │         │ReferralLedger│◀───────┘
//!        │         └──────┬───────┘
//!        ▼                ▼
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │WalletProvider│ │ LedgerStore  │ │    Signer    │
//! └──────────────┘ └──────────────┘ └──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use passage_core::{ClientParts, PassageClient, PassageConfig};
//!
//! let mut client = PassageClient::new(parts, &PassageConfig::default())?;
//! client.capture_from_path("/ref/0xabc")?;
//! client.begin_login().await?;
//! client.claim("welcome").await?;
//! let view = client.snapshot()?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod referral;
pub mod session;
pub mod storage;
pub mod tasks;
pub mod types;

// Re-export main types
pub use client::{ClientParts, PassageClient};
pub use config::{PassageConfig, StorageBackend};
pub use error::{InvalidReferralReason, PassageError};
pub use provider::{
    MockSigner, MockWalletProvider, ProviderError, Signer, SigningError, WalletProvider,
};
pub use referral::{ReferralCapture, ReferralLedger};
pub use session::SessionStateMachine;
pub use storage::{
    open_ledger_store, LedgerStore, MemoryLedgerStore, PendingReferralStore, SessionPendingStore,
    SqliteLedgerStore, StoreError,
};
pub use tasks::{TaskCatalog, TaskDefinition, TaskEngine};
pub use types::*;
