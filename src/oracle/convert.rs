//! USD conversion - rewrites every ticker's quote currency into USD.
//!
//! Conversion factors are resolved leaves-first over the declared pair
//! graph: a quote currency's factor aggregates the direct tickers for that
//! currency from every provider's snapshot, deviation-filtered and
//! VWAP-combined, multiplied through the factors already resolved below it.
//! Primary observations stay gated by each provider's declared pairs; bases
//! with no path to USD are omitted, not errors.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::debug;

use crate::error::DecimalError;
use crate::metrics::Counters;
use crate::types::{AggregatedPrices, DeviationThresholds, PriceObservation, ProviderPairs};

use super::filter;
use super::graph::CurrencyGraph;
use super::stats;

/// The target numeraire everything is rewritten into.
pub const USD_DENOM: &str = "USD";

/// Convert every declared ticker to USD and reduce to one price per base.
///
/// Returns the map of base symbol to final USD price. Bases that cannot be
/// fully converted with the current snapshot are simply absent.
pub fn convert_tickers_to_usd(
    prices: &AggregatedPrices,
    provider_pairs: &ProviderPairs,
    thresholds: &DeviationThresholds,
    counters: &Counters,
) -> Result<BTreeMap<String, Decimal>, DecimalError> {
    if prices.is_empty() {
        return Ok(BTreeMap::new());
    }

    let graph = CurrencyGraph::from_provider_pairs(provider_pairs);
    let factors = resolve_conversion_factors(&graph, prices, thresholds, counters)?;

    // Primary observations: only (provider, pair) combinations the provider
    // is declared authoritative for.
    let mut by_base: BTreeMap<String, Vec<PriceObservation>> = BTreeMap::new();
    for (provider, pairs) in provider_pairs {
        let Some(tickers) = prices.get(provider) else {
            continue;
        };
        for pair in pairs {
            let Some(ticker) = tickers.get(&pair.key()) else {
                continue;
            };
            let Some(factor) = quote_factor(&factors, &pair.quote) else {
                debug!(
                    base = %pair.base,
                    quote = %pair.quote,
                    provider = %provider,
                    "no usd conversion path for quote"
                );
                continue;
            };
            by_base.entry(pair.base.clone()).or_default().push(PriceObservation {
                provider: *provider,
                price: ticker.price * factor,
                volume: ticker.volume,
            });
        }
    }

    let mut rates = BTreeMap::new();
    for (base, observations) in by_base {
        let threshold = filter::threshold_for(&base, thresholds);
        let filtered = filter::filter_deviations(&base, observations, threshold, counters)?;
        if let Some(rate) = stats::vwap(&filtered)? {
            rates.insert(base, rate);
        }
    }
    Ok(rates)
}

/// Resolve the USD factor of every convertible symbol, leaves first.
///
/// A factor combines the direct tickers of its symbol from all snapshots,
/// whichever provider holds them; the declared pair graph only determines
/// which canonical keys to look for and the order to resolve them in.
/// Volume stays inside each factor's own VWAP and is not propagated.
fn resolve_conversion_factors(
    graph: &CurrencyGraph,
    prices: &AggregatedPrices,
    thresholds: &DeviationThresholds,
    counters: &Counters,
) -> Result<BTreeMap<String, Decimal>, DecimalError> {
    let mut factors: BTreeMap<String, Decimal> = BTreeMap::new();

    for symbol in graph.resolution_order(USD_DENOM) {
        let mut observations = Vec::new();
        for quote in graph.quotes_of(&symbol) {
            let Some(factor) = quote_factor(&factors, quote) else {
                continue;
            };
            let key = format!("{symbol}{quote}");
            for (provider, tickers) in prices {
                if let Some(ticker) = tickers.get(&key) {
                    observations.push(PriceObservation {
                        provider: *provider,
                        price: ticker.price * factor,
                        volume: ticker.volume,
                    });
                }
            }
        }

        let threshold = filter::threshold_for(&symbol, thresholds);
        let filtered = filter::filter_deviations(&symbol, observations, threshold, counters)?;
        if let Some(rate) = stats::vwap(&filtered)? {
            factors.insert(symbol, rate);
        }
    }
    Ok(factors)
}

fn quote_factor(factors: &BTreeMap<String, Decimal>, quote: &str) -> Option<Decimal> {
    if quote == USD_DENOM {
        Some(Decimal::ONE)
    } else {
        factors.get(quote).copied()
    }
}
