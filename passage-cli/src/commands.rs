//! Passage CLI commands
//!
//! Drives the core against the simulated wallet and signer so flows can be
//! scripted and the ledger inspected from a shell.

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Subcommand;
use passage_core::{
    open_ledger_store, ClientParts, Identity, MockSigner, MockWalletProvider,
    PassageClient, PassageConfig, ReferralLedger, SessionPendingStore, StorageBackend,
    TaskCatalog,
};
use tracing::{info, warn};

/// Passage CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a scripted login with a simulated passkey wallet
    Simulate {
        /// Address the simulated wallet logs in as
        #[arg(short, long)]
        identity: String,

        /// Navigation path visited before login (e.g. /ref/0xabc)
        #[arg(short, long)]
        path: Option<String>,

        /// Identities to register before the login, so their codes resolve
        #[arg(short, long)]
        referrer: Vec<String>,

        /// Task ids to claim once connected
        #[arg(short, long)]
        claim: Vec<String>,
    },

    /// Show referral stats for an identity (reads the SQLite ledger)
    Stats {
        identity: String,
    },

    /// Print the shareable referral link for an identity
    Link {
        identity: String,
    },

    /// List identities referred by an identity (reads the SQLite ledger)
    Referrals {
        identity: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Execute a command and return its output.
pub async fn execute(config: &PassageConfig, command: Commands) -> anyhow::Result<String> {
    match command {
        Commands::Simulate {
            identity,
            path,
            referrer,
            claim,
        } => simulate(config, &identity, path.as_deref(), &referrer, &claim).await,

        Commands::Stats { identity } => {
            let stats = durable_ledger(config)?.stats_for(&Identity::new(identity))?;
            Ok(serde_json::to_string_pretty(&stats)?)
        }

        Commands::Link { identity } => {
            Ok(ledger(config)?.referral_link(&Identity::new(identity)))
        }

        Commands::Referrals { identity } => {
            let records = durable_ledger(config)?.referrals_by(&Identity::new(identity))?;
            Ok(serde_json::to_string_pretty(&records)?)
        }

        Commands::Config => Ok(config.to_toml()?),
    }
}

fn ledger(config: &PassageConfig) -> anyhow::Result<ReferralLedger> {
    let store = open_ledger_store(&config.storage).context("Failed to open ledger store")?;
    let catalog = Arc::new(TaskCatalog::new(config.tasks.iter().cloned()));
    Ok(ReferralLedger::new(store, catalog, config.referral.clone()))
}

/// Ledger for read commands; an in-memory store would always be empty.
fn durable_ledger(config: &PassageConfig) -> anyhow::Result<ReferralLedger> {
    if config.storage.backend == StorageBackend::Memory {
        bail!(
            "storage.backend is \"memory\", which starts empty on every run; \
             set it to \"sqlite\" or pass --data-dir"
        );
    }
    ledger(config)
}

async fn simulate(
    config: &PassageConfig,
    identity: &str,
    path: Option<&str>,
    referrers: &[String],
    claims: &[String],
) -> anyhow::Result<String> {
    let store = open_ledger_store(&config.storage).context("Failed to open ledger store")?;
    for referrer in referrers {
        store.register_identity(&Identity::new(referrer.as_str()), Utc::now())?;
    }

    let mut client = PassageClient::new(
        ClientParts {
            provider: Arc::new(MockWalletProvider::new(identity)),
            signer: Arc::new(MockSigner::new()),
            pending: Arc::new(SessionPendingStore::new()),
            ledger_store: store,
        },
        config,
    )?;

    if let Some(path) = path {
        match client.capture_from_path(path)? {
            Some(code) => info!(code = %code, "Captured referral code"),
            None => info!(path = %path, "No referral code in path"),
        }
    }

    let state = client.begin_login().await?;
    info!(state = %state, "Login finished");

    for task_id in claims {
        match client.claim(task_id).await {
            Ok(outcome) => info!(task = %task_id, outcome = ?outcome, "Task claim"),
            Err(e) => warn!(task = %task_id, error = %e, "Task claim failed"),
        }
    }

    Ok(serde_json::to_string_pretty(&client.snapshot()?)?)
}
