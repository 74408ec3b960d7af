//! Configuration management for the oracle node
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::CurrencyPair;

/// Upper bound on simulated validators
pub const MAX_VALIDATORS: usize = 10_000;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub oracle: OracleConfig,
    pub logging: LoggingConfig,
    /// Supported pairs registry contents ("BASE/QUOTE")
    pub pairs: Vec<String>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Number of validators in the local simulation
    pub validators: usize,
    /// Voting power assigned to each simulated validator
    pub voting_power: i64,
    /// Delay between simulated heights in milliseconds
    pub block_interval_ms: u64,
    /// Heights to run before exiting (0 = until Ctrl-C)
    pub heights: u64,
    /// First simulated height
    pub initial_height: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Per-provider fetch deadline in milliseconds
    pub provider_timeout_ms: u64,
    /// Maximum relative deviation accepted against local prices (0.10 = 10%)
    pub max_price_deviation: Decimal,
    /// Heights of computed prices kept for vote verification
    pub price_retention_heights: usize,
    /// Candle lookback for the canonical price, in seconds
    pub candle_window_secs: i64,
}

impl OracleConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 2000,
            max_price_deviation: Decimal::new(10, 2),
            price_retention_heights: 10,
            candle_window_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter directive used when RUST_LOG is unset
    pub filter: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Binance,
    Simulated,
    Fixed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    /// Pairs fetched from this provider ("BASE/QUOTE")
    pub pairs: Vec<String>,
    /// REST endpoint override (binance)
    #[serde(default)]
    pub base_url: Option<String>,
    /// Candles requested per pair (binance)
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,
    /// Reference prices keyed by "BASE/QUOTE" (simulated, fixed)
    #[serde(default)]
    pub prices: BTreeMap<String, Decimal>,
    /// Random walk amplitude in basis points (simulated)
    #[serde(default = "default_jitter_bps")]
    pub jitter_bps: u32,
}

fn default_candle_limit() -> usize {
    5
}

fn default_jitter_bps() -> u32 {
    25
}

impl ProviderConfig {
    pub fn currency_pairs(&self) -> Result<Vec<CurrencyPair>> {
        self.pairs
            .iter()
            .map(|p| {
                p.parse::<CurrencyPair>()
                    .with_context(|| format!("provider {}: bad pair {}", self.name, p))
            })
            .collect()
    }

    pub fn reference_prices(&self) -> Result<BTreeMap<CurrencyPair, Decimal>> {
        self.prices
            .iter()
            .map(|(p, price)| {
                let pair = p
                    .parse::<CurrencyPair>()
                    .with_context(|| format!("provider {}: bad price key {}", self.name, p))?;
                Ok((pair, *price))
            })
            .collect()
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Node defaults
            .set_default("node.validators", 3)?
            .set_default("node.voting_power", 10)?
            .set_default("node.block_interval_ms", 1000)?
            .set_default("node.heights", 5)?
            .set_default("node.initial_height", 1)?
            // Oracle defaults
            .set_default("oracle.provider_timeout_ms", 2000)?
            .set_default("oracle.max_price_deviation", "0.10")?
            .set_default("oracle.price_retention_heights", 10)?
            .set_default("oracle.candle_window_secs", 300)?
            // Logging defaults
            .set_default("logging.filter", "vote_ext_oracle=info")?
            .set_default("logging.json", false)?
            .set_default("pairs", vec!["ATOM/USD"])?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (ORACLE_*)
            .add_source(Environment::with_prefix("ORACLE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Reject configurations the protocol cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.oracle.provider_timeout_ms == 0 {
            bail!("oracle.provider_timeout_ms must be positive");
        }
        if self.oracle.max_price_deviation.is_sign_negative() {
            bail!("oracle.max_price_deviation must not be negative");
        }
        if self.oracle.price_retention_heights < 2 {
            bail!("oracle.price_retention_heights must keep at least two heights");
        }
        if self.oracle.candle_window_secs <= 0 {
            bail!("oracle.candle_window_secs must be positive");
        }
        if self.node.validators == 0 || self.node.validators > MAX_VALIDATORS {
            bail!("node.validators must be between 1 and {}", MAX_VALIDATORS);
        }
        if self.node.voting_power < 0 {
            bail!("node.voting_power must not be negative");
        }

        self.supported_pairs()?;

        for provider in &self.providers {
            if provider.pairs.is_empty() {
                bail!("provider {} has no pairs configured", provider.name);
            }
            provider.currency_pairs()?;
            provider.reference_prices()?;
        }

        Ok(())
    }

    pub fn supported_pairs(&self) -> Result<Vec<CurrencyPair>> {
        if self.pairs.is_empty() {
            bail!("at least one supported pair is required");
        }
        self.pairs
            .iter()
            .map(|p| p.parse::<CurrencyPair>().with_context(|| format!("bad pair {}", p)))
            .collect()
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "validators={} pairs={:?} providers={} timeout_ms={} max_dev={}",
            self.node.validators,
            self.pairs,
            self.providers.len(),
            self.oracle.provider_timeout_ms,
            self.oracle.max_price_deviation
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
