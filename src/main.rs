//! Price feeder daemon
//!
//! Loads configuration, connects the configured venue clients, and runs the
//! aggregation loop until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pricefeeder::config::AppConfig;
use pricefeeder::history::PriceHistory;
use pricefeeder::metrics::Counters;
use pricefeeder::oracle::sources::{
    BinanceProvider, CoinbaseProvider, GateProvider, KrakenProvider, Provider,
};
use pricefeeder::oracle::Oracle;
use pricefeeder::types::ProviderName;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    let provider_pairs = config.provider_pairs()?;
    let deviation_thresholds = config.deviation_thresholds()?;

    info!(
        pairs = config.currency_pairs.len(),
        providers = provider_pairs.len(),
        "starting price feeder"
    );

    let counters = Counters::default();
    let reconnect_delay = Duration::from_millis(config.oracle.reconnect_delay_ms);

    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
    if config.oracle.binance_enabled {
        let pairs = provider_pairs
            .get(&ProviderName::Binance)
            .cloned()
            .unwrap_or_default();
        providers.push(Arc::new(BinanceProvider::new(
            pairs,
            counters.clone(),
            reconnect_delay,
        )));
    }
    if config.oracle.coinbase_enabled {
        let pairs = provider_pairs
            .get(&ProviderName::Coinbase)
            .cloned()
            .unwrap_or_default();
        providers.push(Arc::new(CoinbaseProvider::new(pairs, counters.clone())));
    }
    if config.oracle.gate_enabled {
        let pairs = provider_pairs
            .get(&ProviderName::Gate)
            .cloned()
            .unwrap_or_default();
        providers.push(Arc::new(GateProvider::new(pairs, counters.clone())));
    }
    if config.oracle.kraken_enabled {
        let pairs = provider_pairs
            .get(&ProviderName::Kraken)
            .cloned()
            .unwrap_or_default();
        providers.push(Arc::new(KrakenProvider::new(
            pairs,
            counters.clone(),
            reconnect_delay,
        )));
    }

    // Venue websocket loops run for the life of the process.
    for provider in &providers {
        let provider = Arc::clone(provider);
        tokio::spawn(async move {
            if let Err(e) = provider.connect().await {
                warn!(provider = %provider.name(), error = %e, "venue client stopped");
            }
        });
    }

    let history = if config.history.enabled {
        Some(
            PriceHistory::new(&config.history.path)
                .await
                .context("failed to open price history")?,
        )
    } else {
        None
    };

    let oracle = Oracle::new(
        providers,
        provider_pairs,
        deviation_thresholds,
        history,
        counters,
        Duration::from_secs(config.oracle.tick_interval_secs),
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    oracle.run(shutdown).await
}
