//! Venue client implementations (Binance, Coinbase, Gate, Kraken)

mod binance;
mod coinbase;
mod gate;
mod kraken;

pub use binance::BinanceProvider;
pub use coinbase::CoinbaseProvider;
pub use gate::GateProvider;
pub use kraken::KrakenProvider;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::error::TickerError;
use crate::types::{CurrencyPair, ProviderName, TickerPrice};

/// A venue the oracle can pull ticker snapshots from.
///
/// Implementations own a websocket loop that keeps an internal wire-keyed
/// snapshot current; the oracle reads it synchronously once per tick.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> ProviderName;

    /// Current snapshot entries for the requested pairs, keyed by the
    /// canonical pair string. Fails when a requested pair has no entry.
    fn get_ticker_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<BTreeMap<String, TickerPrice>, TickerError>;

    /// Venue-specific control frames subscribing to the given pairs,
    /// serialized and ready to send.
    fn get_subscription_messages(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<Vec<String>, serde_json::Error>;

    /// Connect and stream ticker updates into the snapshot until the
    /// connection dies or the task is dropped.
    async fn connect(&self) -> Result<()>;
}

/// Wire-keyed ticker snapshot shared between a venue's websocket task and
/// the aggregation tick. Reads copy values out so a tick never observes a
/// mid-flight mutation.
#[derive(Clone, Default)]
pub struct TickerSnapshot {
    inner: Arc<RwLock<HashMap<String, TickerPrice>>>,
}

impl TickerSnapshot {
    pub fn set(&self, wire_symbol: String, ticker: TickerPrice) {
        self.inner
            .write()
            .expect("ticker snapshot lock poisoned")
            .insert(wire_symbol, ticker);
    }

    pub fn get(&self, wire_symbol: &str) -> Option<TickerPrice> {
        self.inner
            .read()
            .expect("ticker snapshot lock poisoned")
            .get(wire_symbol)
            .cloned()
    }
}

/// Shared `get_ticker_prices` body: translate each pair through the venue's
/// wire symbol, read the snapshot, and key the result canonically.
pub(crate) fn ticker_prices_from_snapshot(
    name: ProviderName,
    snapshot: &TickerSnapshot,
    pairs: &[CurrencyPair],
    wire_symbol: impl Fn(&CurrencyPair) -> String,
) -> Result<BTreeMap<String, TickerPrice>, TickerError> {
    let mut prices = BTreeMap::new();
    for pair in pairs {
        let wire = wire_symbol(pair);
        let ticker = snapshot.get(&wire).ok_or_else(|| TickerError::MissingTicker {
            provider: name.to_string(),
            symbol: wire,
        })?;
        prices.insert(pair.key(), ticker);
    }
    Ok(prices)
}
