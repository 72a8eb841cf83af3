//! Node configuration
//!
//! Settings load once at startup: defaults, then an optional TOML file
//! (`FORGE_CONFIG` path or `./forge.toml`), then `FORGE_*` environment
//! overrides. Components receive plain values from here instead of reading
//! the environment themselves.

use crate::error::{ChainError, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

pub static GLOBAL_SETTINGS: Lazy<Settings> = Lazy::new(|| {
    Settings::load().unwrap_or_else(|e| {
        log::warn!("Falling back to default settings: {e}");
        Settings::default()
    })
});

const DEFAULT_DIFFICULTY: u32 = 5;
const DEFAULT_BLOCK_REWARD: u32 = 281_190;
const DEFAULT_MAX_TRANSACTIONS_PER_BLOCK: usize = 10;
const DEFAULT_MINING_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory holding the sled database
    pub data_dir: PathBuf,
    /// Leading-zero hex characters a block hash must carry
    pub difficulty: u32,
    /// Fixed coinbase subsidy per block
    pub block_reward: u32,
    /// Block capacity including the coinbase
    pub max_transactions_per_block: usize,
    /// Pause between mining rounds
    pub mining_interval_secs: u64,
    /// Unlock-slot message of the genesis coinbase
    pub genesis_message: String,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            data_dir: PathBuf::from("data"),
            difficulty: DEFAULT_DIFFICULTY,
            block_reward: DEFAULT_BLOCK_REWARD,
            max_transactions_per_block: DEFAULT_MAX_TRANSACTIONS_PER_BLOCK,
            mining_interval_secs: DEFAULT_MINING_INTERVAL_SECS,
            genesis_message: "forge-chain genesis".to_string(),
        }
    }
}

impl Settings {
    /// File (if present) layered under environment overrides.
    pub fn load() -> Result<Settings> {
        let path = env::var("FORGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("forge.toml"));

        let mut settings = if path.exists() {
            Settings::from_file(&path)?
        } else {
            Settings::default()
        };
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Settings> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| ChainError::Config(format!("Bad config file {}: {e}", path.display())))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = env::var("FORGE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(value) = env::var("FORGE_DIFFICULTY") {
            self.difficulty = parse_env("FORGE_DIFFICULTY", &value)?;
        }
        if let Ok(value) = env::var("FORGE_BLOCK_REWARD") {
            self.block_reward = parse_env("FORGE_BLOCK_REWARD", &value)?;
        }
        if let Ok(value) = env::var("FORGE_MAX_TRANSACTIONS_PER_BLOCK") {
            self.max_transactions_per_block = parse_env("FORGE_MAX_TRANSACTIONS_PER_BLOCK", &value)?;
        }
        if let Ok(value) = env::var("FORGE_MINING_INTERVAL_SECS") {
            self.mining_interval_secs = parse_env("FORGE_MINING_INTERVAL_SECS", &value)?;
        }
        if let Ok(message) = env::var("FORGE_GENESIS_MESSAGE") {
            self.genesis_message = message;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ChainError::Config(format!("{key} has an unparsable value {value:?}")))
}
