//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults, so a partial file (or no file) is valid.
//! `BETLAB_DATABASE_URL` overrides the ledger database location.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::backtest::{AccumulatorConfig, BacktestConfig, PreviewConfig, TeamReportConfig};
use crate::engine::{BankrollConfig, ScannerConfig};
use crate::strategy::odds::OddsConfig;
use crate::strategy::risk::RiskConfig;

pub const DATABASE_URL_ENV: &str = "BETLAB_DATABASE_URL";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: BacktestConfig,
    pub odds: OddsConfig,
    pub accumulator: AccumulatorConfig,
    pub preview: PreviewConfig,
    pub teams: TeamReportConfig,
    pub scanner: ScannerConfig,
    pub bankroll: BankrollConfig,
    pub risk: RiskConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            debug!(path = %path.display(), "No config file — using defaults");
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.bankroll.database_url = url;
            }
        }
    }
}
