//! Core types used throughout the price feeder
//!
//! Defines currency pairs, ticker observations and the provider-keyed maps
//! the aggregation pipeline operates on.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::parse_decimal;
use crate::error::TickerError;

/// An ordered base/quote currency pair.
///
/// Symbols are uppercase ASCII tickers (e.g. `ATOM`). The canonical string
/// form concatenates base and quote with no separator (`ATOMUSDT`);
/// venue-specific delimiters (`-`, `_`, `/`) exist only at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Canonical pair key: base and quote concatenated with no separator.
    pub fn key(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.quote)
    }
}

/// A single ticker observation: last price and 24h volume at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerPrice {
    pub price: Decimal,
    pub volume: Decimal,
    pub time: DateTime<Utc>,
}

impl TickerPrice {
    /// Parse a ticker from wire strings, rejecting malformed decimals and
    /// negative values.
    pub fn new(price: &str, volume: &str, time: DateTime<Utc>) -> Result<Self, TickerError> {
        let price = parse_decimal(price)?;
        let volume = parse_decimal(volume)?;
        if price.is_sign_negative() && !price.is_zero() {
            return Err(TickerError::NegativePrice(price));
        }
        if volume.is_sign_negative() && !volume.is_zero() {
            return Err(TickerError::NegativeVolume(volume));
        }
        Ok(Self { price, volume, time })
    }
}

/// The venues this feeder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Binance,
    Coinbase,
    Gate,
    Kraken,
    Kucoin,
    Huobi,
    Osmosis,
}

impl ProviderName {
    /// Parse from a config string. Unknown names yield None.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "binance" => Some(ProviderName::Binance),
            "coinbase" => Some(ProviderName::Coinbase),
            "gate" => Some(ProviderName::Gate),
            "kraken" => Some(ProviderName::Kraken),
            "kucoin" => Some(ProviderName::Kucoin),
            "huobi" => Some(ProviderName::Huobi),
            "osmosis" => Some(ProviderName::Osmosis),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderName::Binance => write!(f, "binance"),
            ProviderName::Coinbase => write!(f, "coinbase"),
            ProviderName::Gate => write!(f, "gate"),
            ProviderName::Kraken => write!(f, "kraken"),
            ProviderName::Kucoin => write!(f, "kucoin"),
            ProviderName::Huobi => write!(f, "huobi"),
            ProviderName::Osmosis => write!(f, "osmosis"),
        }
    }
}

/// Per-provider ticker snapshots, keyed by canonical pair string.
pub type AggregatedPrices = BTreeMap<ProviderName, BTreeMap<String, TickerPrice>>;

/// The pairs each provider is authoritative for. Tickers a provider exposes
/// without a declared pair are ignored by the primary aggregation.
pub type ProviderPairs = BTreeMap<ProviderName, Vec<CurrencyPair>>;

/// Per-base-asset overrides of the default deviation threshold.
pub type DeviationThresholds = BTreeMap<String, Decimal>;

/// One USD-converted price observation for a single asset.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub provider: ProviderName,
    pub price: Decimal,
    pub volume: Decimal,
}
