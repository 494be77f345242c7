//! Deviation filter - drops prices straying too far from their peers.
//!
//! For each asset the filter computes the mean and population standard
//! deviation of the prices seen across providers and keeps only observations
//! within `mean ± T * sigma`. `T` defaults to 1 and can be overridden per
//! base asset in configuration.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::DEFAULT_DEVIATION_THRESHOLD;
use crate::error::DecimalError;
use crate::metrics::Counters;
use crate::types::{AggregatedPrices, DeviationThresholds, PriceObservation};

use super::stats;

/// Threshold for `symbol`: the configured override, or the default.
pub fn threshold_for(symbol: &str, thresholds: &DeviationThresholds) -> Decimal {
    thresholds
        .get(symbol)
        .copied()
        .unwrap_or(DEFAULT_DEVIATION_THRESHOLD)
}

/// Keep the observations of one symbol that fall inside `mean ± T * sigma`.
///
/// The band is inclusive on both ends. When the deviation is undefined
/// (fewer than two observations) or zero, everything is accepted. Dropped
/// observations are logged and counted, never fatal.
pub fn filter_deviations(
    symbol: &str,
    observations: Vec<PriceObservation>,
    threshold: Decimal,
    counters: &Counters,
) -> Result<Vec<PriceObservation>, DecimalError> {
    let prices: Vec<Decimal> = observations.iter().map(|o| o.price).collect();
    let Some((mean, deviation)) = stats::mean_and_deviation(&prices)? else {
        return Ok(observations);
    };
    if deviation.is_zero() {
        return Ok(observations);
    }

    let margin = deviation * threshold;
    let low = mean - margin;
    let high = mean + margin;

    let mut kept = Vec::with_capacity(observations.len());
    for observation in observations {
        if observation.price >= low && observation.price <= high {
            kept.push(observation);
        } else {
            Counters::incr(&counters.ticker_deviations);
            debug!(
                base = symbol,
                provider = %observation.provider,
                price = %observation.price,
                mean = %mean,
                margin = %margin,
                "deviating price"
            );
        }
    }
    Ok(kept)
}

/// Filter a whole provider -> symbol price map.
///
/// Regroups the map per symbol, applies the per-symbol filter, and rebuilds
/// the provider-keyed shape. Granularity is per observation: a provider
/// losing one asset keeps its others.
pub fn filter_ticker_deviations(
    prices: &AggregatedPrices,
    thresholds: &DeviationThresholds,
    counters: &Counters,
) -> Result<AggregatedPrices, DecimalError> {
    let mut by_symbol: BTreeMap<&str, Vec<PriceObservation>> = BTreeMap::new();
    for (provider, tickers) in prices {
        for (symbol, ticker) in tickers {
            by_symbol.entry(symbol).or_default().push(PriceObservation {
                provider: *provider,
                price: ticker.price,
                volume: ticker.volume,
            });
        }
    }

    let mut filtered = AggregatedPrices::new();
    for (symbol, observations) in by_symbol {
        let threshold = threshold_for(symbol, thresholds);
        for kept in filter_deviations(symbol, observations, threshold, counters)? {
            let ticker = prices[&kept.provider][symbol].clone();
            filtered
                .entry(kept.provider)
                .or_insert_with(BTreeMap::new)
                .insert(symbol.to_string(), ticker);
        }
    }
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProviderName, TickerPrice};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn obs(provider: ProviderName, price: Decimal) -> PriceObservation {
        PriceObservation {
            provider,
            price,
            volume: dec!(1994674.34),
        }
    }

    fn atom_observations() -> Vec<PriceObservation> {
        vec![
            obs(ProviderName::Binance, dec!(29.93)),
            obs(ProviderName::Huobi, dec!(29.93)),
            obs(ProviderName::Kraken, dec!(29.93)),
            obs(ProviderName::Coinbase, dec!(27.1)),
        ]
    }

    #[test]
    fn test_default_threshold_drops_outlier() {
        let counters = Counters::default();
        let kept = filter_deviations("ATOM", atom_observations(), dec!(1), &counters).unwrap();
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|o| o.provider != ProviderName::Coinbase));
        assert_eq!(Counters::read(&counters.ticker_deviations), 1);
    }

    #[test]
    fn test_custom_threshold_keeps_outlier() {
        let counters = Counters::default();
        let kept = filter_deviations("ATOM", atom_observations(), dec!(2), &counters).unwrap();
        assert_eq!(kept.len(), 4);
        assert_eq!(Counters::read(&counters.ticker_deviations), 0);
    }

    #[test]
    fn test_band_is_inclusive() {
        // two prices: both sit exactly on the band edges and survive
        let counters = Counters::default();
        let observations = vec![
            obs(ProviderName::Binance, dec!(29970)),
            obs(ProviderName::Kraken, dec!(30050)),
        ];
        let kept = filter_deviations("BTC", observations, dec!(1), &counters).unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_single_observation_passes_through() {
        let counters = Counters::default();
        let observations = vec![obs(ProviderName::Binance, dec!(42))];
        let kept = filter_deviations("FOO", observations.clone(), dec!(1), &counters).unwrap();
        assert_eq!(kept, observations);
    }

    #[test]
    fn test_growing_threshold_grows_the_accepted_set() {
        let counters = Counters::default();
        let mut last = 0;
        for t in [dec!(0.1), dec!(0.5), dec!(1), dec!(2), dec!(1000)] {
            let kept =
                filter_deviations("ATOM", atom_observations(), t, &counters).unwrap();
            assert!(kept.len() >= last);
            last = kept.len();
        }
        assert_eq!(last, 4);
    }

    #[test]
    fn test_full_map_filter_is_per_observation() {
        // coinbase's ATOM deviates but its OSMO does not; only ATOM goes
        let now = Utc::now();
        let ticker = |price: Decimal| TickerPrice {
            price,
            volume: dec!(10),
            time: now,
        };

        let mut prices = AggregatedPrices::new();
        for provider in [ProviderName::Binance, ProviderName::Huobi, ProviderName::Kraken] {
            prices.insert(
                provider,
                BTreeMap::from([
                    ("ATOM".to_string(), ticker(dec!(29.93))),
                    ("OSMO".to_string(), ticker(dec!(0.8))),
                ]),
            );
        }
        prices.insert(
            ProviderName::Coinbase,
            BTreeMap::from([
                ("ATOM".to_string(), ticker(dec!(27.1))),
                ("OSMO".to_string(), ticker(dec!(0.8))),
            ]),
        );

        let counters = Counters::default();
        let filtered =
            filter_ticker_deviations(&prices, &DeviationThresholds::new(), &counters).unwrap();

        let coinbase = &filtered[&ProviderName::Coinbase];
        assert!(!coinbase.contains_key("ATOM"));
        assert!(coinbase.contains_key("OSMO"));
        assert_eq!(filtered[&ProviderName::Binance].len(), 2);
    }
}
