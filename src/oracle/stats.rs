//! Price statistics: VWAP, mean, population standard deviation.

use rust_decimal::Decimal;

use crate::decimal::{div18, sqrt};
use crate::error::DecimalError;
use crate::types::PriceObservation;

/// Volume-weighted average price over a set of observations.
///
/// Zero total volume falls back to the unweighted mean, so weightless
/// observations still produce a price. Empty input yields `None`; the caller
/// omits the asset.
pub fn vwap(observations: &[PriceObservation]) -> Result<Option<Decimal>, DecimalError> {
    if observations.is_empty() {
        return Ok(None);
    }
    let total_volume: Decimal = observations.iter().map(|o| o.volume).sum();
    if total_volume.is_zero() {
        let prices: Vec<Decimal> = observations.iter().map(|o| o.price).collect();
        return Ok(Some(mean(&prices)?));
    }
    let weighted: Decimal = observations.iter().map(|o| o.price * o.volume).sum();
    Ok(Some(div18(weighted, total_volume)?))
}

/// Arithmetic mean of a non-empty price list.
pub fn mean(prices: &[Decimal]) -> Result<Decimal, DecimalError> {
    let sum: Decimal = prices.iter().copied().sum();
    div18(sum, Decimal::from(prices.len() as u64))
}

/// Mean and population standard deviation (divide by N, not N-1).
///
/// Fewer than two prices leave the deviation undefined; the caller then
/// accepts every observation.
pub fn mean_and_deviation(
    prices: &[Decimal],
) -> Result<Option<(Decimal, Decimal)>, DecimalError> {
    if prices.len() < 2 {
        return Ok(None);
    }
    let mu = mean(prices)?;
    let squared: Decimal = prices
        .iter()
        .map(|p| {
            let d = *p - mu;
            d * d
        })
        .sum();
    let variance = div18(squared, Decimal::from(prices.len() as u64))?;
    Ok(Some((mu, sqrt(variance)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderName;
    use rust_decimal_macros::dec;

    fn obs(price: Decimal, volume: Decimal) -> PriceObservation {
        PriceObservation {
            provider: ProviderName::Binance,
            price,
            volume,
        }
    }

    #[test]
    fn test_vwap_single_observation_is_identity() {
        let price = vwap(&[obs(dec!(30017.5), dec!(42))]).unwrap().unwrap();
        assert_eq!(price, dec!(30017.5));
    }

    #[test]
    fn test_vwap_weights_by_volume() {
        let price = vwap(&[
            obs(dec!(30000), dec!(10)),
            obs(dec!(30010), dec!(10)),
            obs(dec!(30020), dec!(100)),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(price, dec!(30017.5));
    }

    #[test]
    fn test_vwap_zero_volume_falls_back_to_mean() {
        let price = vwap(&[obs(dec!(10), dec!(0)), obs(dec!(20), dec!(0))])
            .unwrap()
            .unwrap();
        assert_eq!(price, dec!(15));
    }

    #[test]
    fn test_vwap_empty_is_none() {
        assert_eq!(vwap(&[]).unwrap(), None);
    }

    #[test]
    fn test_vwap_stays_within_bounds() {
        let observations = vec![
            obs(dec!(29950), dec!(3)),
            obs(dec!(30080), dec!(7)),
            obs(dec!(30010), dec!(11)),
        ];
        let price = vwap(&observations).unwrap().unwrap();
        assert!(price >= dec!(29950) && price <= dec!(30080));
    }

    #[test]
    fn test_deviation_undefined_below_two_prices() {
        assert_eq!(mean_and_deviation(&[dec!(10)]).unwrap(), None);
        assert_eq!(mean_and_deviation(&[]).unwrap(), None);
    }

    #[test]
    fn test_population_deviation() {
        // prices 29970 and 30050: mean 30010, sigma exactly 40
        let (mu, sigma) = mean_and_deviation(&[dec!(29970), dec!(30050)])
            .unwrap()
            .unwrap();
        assert_eq!(mu, dec!(30010));
        assert_eq!(sigma, dec!(40));
    }

    #[test]
    fn test_identical_prices_have_zero_deviation() {
        let (mu, sigma) = mean_and_deviation(&[dec!(29.93), dec!(29.93), dec!(29.93)])
            .unwrap()
            .unwrap();
        assert_eq!(mu, dec!(29.93));
        assert!(sigma.is_zero());
    }
}
