//! Configuration management for the price feeder
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

use crate::decimal::parse_decimal;
use crate::types::{CurrencyPair, DeviationThresholds, ProviderName, ProviderPairs};

/// Default number of standard deviations a price may stray from the mean
/// before the filter discards it. Overridable per base asset via
/// `deviation_thresholds`.
pub const DEFAULT_DEVIATION_THRESHOLD: Decimal = Decimal::ONE;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub oracle: OracleConfig,
    /// The pairs to feed, each listing the providers authoritative for it.
    pub currency_pairs: Vec<CurrencyPairConfig>,
    /// Per-base-asset deviation threshold overrides, as decimal strings.
    #[serde(default)]
    pub deviation_thresholds: HashMap<String, String>,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Seconds between aggregation ticks
    pub tick_interval_secs: u64,
    /// Reconnect delay for venue websockets in milliseconds
    pub reconnect_delay_ms: u64,
    /// Enable the Binance price feed
    pub binance_enabled: bool,
    /// Enable the Coinbase price feed
    pub coinbase_enabled: bool,
    /// Enable the Gate price feed
    pub gate_enabled: bool,
    /// Enable the Kraken price feed
    pub kraken_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyPairConfig {
    pub base: String,
    pub quote: String,
    pub providers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Enable the sqlite ticker archive
    pub enabled: bool,
    /// Sqlite path, e.g. `sqlite://prices.db`
    pub path: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Oracle defaults
            .set_default("oracle.tick_interval_secs", 5)?
            .set_default("oracle.reconnect_delay_ms", 5000)?
            .set_default("oracle.binance_enabled", true)?
            .set_default("oracle.coinbase_enabled", true)?
            .set_default("oracle.gate_enabled", false)?
            .set_default("oracle.kraken_enabled", true)?
            // History defaults
            .set_default("history.enabled", true)?
            .set_default("history.path", "sqlite://prices.db")?
            // Load config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables
            .add_source(Environment::with_prefix("PRICEFEEDER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<()> {
        if self.currency_pairs.is_empty() {
            bail!("No currency pairs configured");
        }
        for pair in &self.currency_pairs {
            if pair.base.is_empty() || pair.quote.is_empty() {
                bail!("Currency pair with empty base or quote");
            }
            if pair.providers.is_empty() {
                bail!("Currency pair {}{} lists no providers", pair.base, pair.quote);
            }
        }
        Ok(())
    }

    /// Invert the per-pair provider lists into the provider -> pairs map the
    /// aggregation pipeline consumes.
    pub fn provider_pairs(&self) -> Result<ProviderPairs> {
        let mut pairs = ProviderPairs::new();
        for entry in &self.currency_pairs {
            let pair = CurrencyPair::new(entry.base.as_str(), entry.quote.as_str());
            for name in &entry.providers {
                let Some(provider) = ProviderName::from_str(name) else {
                    bail!("Unknown provider {:?} for pair {}", name, pair);
                };
                pairs.entry(provider).or_default().push(pair.clone());
            }
        }
        Ok(pairs)
    }

    /// Parse and validate the per-asset deviation threshold overrides.
    pub fn deviation_thresholds(&self) -> Result<DeviationThresholds> {
        let mut thresholds = DeviationThresholds::new();
        for (base, raw) in &self.deviation_thresholds {
            let threshold = parse_decimal(raw)
                .with_context(|| format!("Bad deviation threshold for {base}"))?;
            if threshold <= Decimal::ZERO {
                bail!("Deviation threshold for {base} must be positive, got {raw}");
            }
            thresholds.insert(base.to_uppercase(), threshold);
        }
        Ok(thresholds)
    }
}
