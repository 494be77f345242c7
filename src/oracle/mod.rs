//! Oracle module - multi-venue price aggregation
//!
//! Assembles a ticker snapshot from every configured venue each tick and
//! reconciles it into one USD price per asset: USD conversion over the
//! declared pair graph, deviation filtering, VWAP aggregation. A tick is a
//! pure function of its inputs; nothing is cached between ticks.

pub mod convert;
pub mod filter;
pub mod graph;
pub mod sources;
pub mod stats;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::history::PriceHistory;
use crate::metrics::Counters;
use crate::types::{AggregatedPrices, CurrencyPair, DeviationThresholds, ProviderPairs};

use sources::Provider;

pub struct Oracle {
    providers: Vec<Arc<dyn Provider>>,
    provider_pairs: ProviderPairs,
    deviation_thresholds: DeviationThresholds,
    history: Option<PriceHistory>,
    counters: Counters,
    tick_interval: Duration,
    prices: RwLock<BTreeMap<String, Decimal>>,
}

impl Oracle {
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        provider_pairs: ProviderPairs,
        deviation_thresholds: DeviationThresholds,
        history: Option<PriceHistory>,
        counters: Counters,
        tick_interval: Duration,
    ) -> Self {
        Self {
            providers,
            provider_pairs,
            deviation_thresholds,
            history,
            counters,
            tick_interval,
            prices: RwLock::new(BTreeMap::new()),
        }
    }

    /// Last computed per-asset USD prices.
    pub fn get_prices(&self) -> BTreeMap<String, Decimal> {
        self.prices
            .read()
            .expect("price map lock poisoned")
            .clone()
    }

    /// Run the aggregation loop until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
        let mut interval = tokio::time::interval(self.tick_interval);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "aggregation tick failed");
                    }
                }
                _ = &mut shutdown => {
                    info!("oracle shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// One end-to-end aggregation pass.
    pub async fn tick(&self) -> Result<()> {
        let snapshot = self.collect_prices();
        self.record_history(&snapshot).await;

        let rates = convert::convert_tickers_to_usd(
            &snapshot,
            &self.provider_pairs,
            &self.deviation_thresholds,
            &self.counters,
        )?;

        info!(assets = rates.len(), "computed oracle prices");
        for (base, price) in &rates {
            debug!(base = %base, price = %price, "oracle price");
        }
        *self.prices.write().expect("price map lock poisoned") = rates;
        Ok(())
    }

    /// Pull each provider's snapshot for the pairs it is declared
    /// authoritative for. A failing provider is skipped, not fatal.
    fn collect_prices(&self) -> AggregatedPrices {
        let mut aggregated = AggregatedPrices::new();
        for provider in &self.providers {
            let name = provider.name();
            let pairs: &[CurrencyPair] = self
                .provider_pairs
                .get(&name)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if pairs.is_empty() {
                continue;
            }
            match provider.get_ticker_prices(pairs) {
                Ok(tickers) => {
                    aggregated.insert(name, tickers);
                }
                Err(e) => {
                    Counters::incr(&self.counters.provider_failures);
                    warn!(provider = %name, error = %e, "failed to collect provider snapshot");
                }
            }
        }
        aggregated
    }

    /// Hand every observation to the history sink. Store errors are logged
    /// and counted, never propagated into the tick.
    async fn record_history(&self, snapshot: &AggregatedPrices) {
        let Some(history) = &self.history else {
            return;
        };
        for (provider, pairs) in &self.provider_pairs {
            let Some(tickers) = snapshot.get(provider) else {
                continue;
            };
            for pair in pairs {
                let Some(ticker) = tickers.get(&pair.key()) else {
                    continue;
                };
                if let Err(e) = history.add_ticker_price(pair, *provider, ticker).await {
                    Counters::incr(&self.counters.store_failures);
                    warn!(pair = %pair, provider = %provider, error = %e, "failed to store ticker");
                }
            }
        }
    }
}
