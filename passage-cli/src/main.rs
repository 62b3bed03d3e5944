//! passage: command-line driver for the Passage session and referral core
//!
//! Runs scripted passkey logins against a simulated wallet and inspects the
//! referral ledger:
//! - `simulate` visits a path, logs in, claims tasks and prints the snapshot
//! - `stats`, `link` and `referrals` read the ledger
//! - `config` prints the effective configuration

mod commands;

use std::path::{Path, PathBuf};

use clap::Parser;
use passage_core::{PassageConfig, StorageBackend};
use tracing::info;
use tracing_subscriber::EnvFilter;

use commands::Commands;

#[derive(Parser)]
#[command(name = "passage")]
#[command(about = "Passkey session and referral attribution driver")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "passage.toml")]
    config: String,

    /// Data directory; implies the SQLite ledger
    #[arg(short, long, env = "PASSAGE_DATA_DIR")]
    data_dir: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Load the config file, or defaults backed by the SQLite ledger so that
/// successive commands see the same records.
fn load_config(path: &str) -> anyhow::Result<PassageConfig> {
    if Path::new(path).exists() {
        let content = std::fs::read_to_string(path)?;
        Ok(PassageConfig::from_toml(&content)?)
    } else {
        let mut config = PassageConfig::default();
        config.storage.backend = StorageBackend::Sqlite;
        Ok(config)
    }
}

fn init_tracing(config: &PassageConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.general.log_level))?;

    // Logs go to stderr; stdout carries command output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.general.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;

    // Apply CLI overrides
    if cli.json_logs {
        config.general.json_logs = true;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.data_dir = PathBuf::from(data_dir);
    }

    init_tracing(&config)?;

    if Path::new(&cli.config).exists() {
        info!(path = %cli.config, "Loaded config");
    } else {
        info!(path = %cli.config, "Config file not found, using defaults");
    }
    info!(
        backend = ?config.storage.backend,
        data_dir = %config.storage.data_dir.display(),
        "Ledger storage"
    );

    match commands::execute(&config, cli.command).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_load_config_falls_back_to_defaults() {
        let config = load_config("/nonexistent/passage.toml").unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.tasks.len(), 1);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("passage.toml");
        std::fs::write(
            &path,
            "[referral]\npoints_per_referral = 25\n\n[storage]\nbackend = \"sqlite\"\n",
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.referral.points_per_referral, 25);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }
}
