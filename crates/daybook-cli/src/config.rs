//! Configuration loading: optional TOML file plus `DAYBOOK_*` overrides.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use daybook_core::{LedgerSettings, node_key::NodeSecret, token::DEFAULT_TOKEN_LENGTH};
use serde::Deserialize;

/// Shape of `daybook.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
  #[serde(default = "default_store_path")]
  pub store_path:           PathBuf,
  /// HMAC key for node keys. Only `export` needs it.
  #[serde(default)]
  pub node_secret:          Option<NodeSecret>,
  #[serde(default = "default_token_length")]
  pub token_length:         usize,
  #[serde(default = "default_max_rebuild_attempts")]
  pub max_rebuild_attempts: u32,
  /// Zones allowed to decode state tokens.
  #[serde(default)]
  pub trusted_zones:        Vec<String>,
}

fn default_store_path() -> PathBuf { PathBuf::from("daybook.sqlite3") }

fn default_token_length() -> usize { DEFAULT_TOKEN_LENGTH }

fn default_max_rebuild_attempts() -> u32 { 3 }

impl LedgerConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("DAYBOOK")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("trusted_zones"),
      )
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise LedgerConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }

  pub fn ledger_settings(&self) -> LedgerSettings {
    LedgerSettings {
      token_length:         self.token_length,
      max_rebuild_attempts: self.max_rebuild_attempts,
    }
  }

  pub fn is_trusted_zone(&self, zone: &str) -> bool {
    self.trusted_zones.iter().any(|z| z == zone)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
