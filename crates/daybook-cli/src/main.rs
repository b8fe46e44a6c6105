//! `daybook`: command-line front end for the daily attendance ledger.
//!
//! Reads `daybook.toml` (or the path given with `--config`), opens the SQLite
//! store and runs one subcommand. Results are printed to stdout as JSON; logs
//! go to stderr.
//!
//! # Usage
//!
//! ```
//! daybook ingest-raw --subject c1 --date 2024-04-01 --type check_in --payload '{"minutes":30}'
//! daybook set-base --subject c1 --month 2024-04 --code NORMAL
//! daybook rebuild --subject c1 --date 2024-04-01 --reason INGEST
//! daybook decode --subject c1 --date 2024-04-01 --dict-id <id> --zone office
//! ```

mod commands;
mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use daybook_core::{
  Ledger,
  store::LedgerStore as _,
  token::{TokenCodec, UnicodePools},
};
use daybook_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{commands::Command, config::LedgerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Daily attendance ledger")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "daybook.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = LedgerConfig::load(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  // First run stores a fresh partition; later runs get the stored one back.
  let partition = store
    .init_pool_partition(UnicodePools::default().partition())
    .await
    .context("failed to load codec pools")?;
  let pools = UnicodePools::from_partition(partition)
    .context("stored codec pools are invalid")?;

  let ledger = Ledger::new(
    Arc::new(store),
    Arc::new(TokenCodec::with_pools(pools)),
    cfg.ledger_settings(),
  );

  commands::run(cli.command, &ledger, &cfg).await
}
