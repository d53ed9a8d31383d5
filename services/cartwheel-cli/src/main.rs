//! Command-line storefront client.
//!
//! Keeps cart, wishlist and account state in RocksDB under `--data-dir` and
//! talks to the storefront API at `--api-url` for signed-in users.
//!
//! ```bash
//! cartwheel cart add p1 --name Lamp --price 39.90 --quantity 2
//! cartwheel cart coupon SALE10
//! cartwheel cart show --express
//! cartwheel sign-in --user-id 42 --token "$TOKEN"
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use cw_backend::{OfflineBackend, StorefrontBackend};
use cw_backend_http::HttpBackend;
use cw_identity::StoredSession;
use cw_ledger::{LedgerConfig, Storefront};
use cw_storage::{LocalStore, RocksDbStore, StorageScope, TabId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(name = "cartwheel")]
#[command(author, version, about = "Cartwheel storefront client")]
struct Cli {
    /// Directory holding the local stores
    #[arg(long, env = "CARTWHEEL_DATA_DIR", default_value = ".cartwheel")]
    data_dir: PathBuf,

    /// Storefront API base URL
    #[arg(long, env = "CARTWHEEL_API_URL")]
    api_url: Option<String>,

    /// Keep everything local; backend calls fail and local state is kept
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let shop = open_storefront(&cli.data_dir, cli.api_url.clone(), cli.offline)?;
    let output = commands::execute(&shop, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn open_storefront(data_dir: &Path, api_url: Option<String>, offline: bool) -> Result<Storefront> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let config = LedgerConfig::from_env();
    let tab = TabId::new_random();
    let durable = Arc::new(LocalStore::new(
        Arc::new(RocksDbStore::open_default(data_dir.join("durable"))?),
        StorageScope::Durable,
        tab.clone(),
    ));
    let session_scope = Arc::new(LocalStore::new(
        Arc::new(RocksDbStore::open_default(data_dir.join("session"))?),
        StorageScope::Session,
        tab,
    ));

    let backend: Arc<dyn StorefrontBackend> = if offline {
        Arc::new(OfflineBackend)
    } else {
        let sessions = Arc::new(StoredSession::new(durable.clone(), &config.key_prefix));
        let http = HttpBackend::new(api_url, sessions);
        info!(endpoint = http.endpoint(), "using storefront API");
        Arc::new(http)
    };

    Ok(Storefront::new(config, durable, session_scope, backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_before_subcommand() -> Result<()> {
        let cli = Cli::try_parse_from([
            "cartwheel",
            "--data-dir",
            "/tmp/cw",
            "--offline",
            "cart",
            "show",
        ])?;
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/cw"));
        assert!(cli.offline);
        Ok(())
    }

    #[test]
    fn storefront_opens_on_fresh_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let shop = open_storefront(&dir.path().join("nested"), None, true)?;

        assert!(shop.identity().current_owner_id().is_guest());
        assert_eq!(shop.counters().cart_items, 0);
        Ok(())
    }
}
