//! Sqlite history sink round trips

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    use pricefeeder::history::PriceHistory;
    use pricefeeder::types::{CurrencyPair, ProviderName, TickerPrice};

    async fn in_memory() -> PriceHistory {
        PriceHistory::new("sqlite::memory:").await.unwrap()
    }

    fn ticker(price: &str, volume: &str, time: chrono::DateTime<Utc>) -> TickerPrice {
        TickerPrice::new(price, volume, time).unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_groups_by_provider() {
        let history = in_memory().await;
        let pair = CurrencyPair::new("ATOM", "USDT");
        let now = Utc::now();

        history
            .add_ticker_price(&pair, ProviderName::Binance, &ticker("34.69", "100", now))
            .await
            .unwrap();
        history
            .add_ticker_price(
                &pair,
                ProviderName::Binance,
                &ticker("34.71", "110", now + Duration::seconds(5)),
            )
            .await
            .unwrap();
        history
            .add_ticker_price(&pair, ProviderName::Kraken, &ticker("34.68", "90", now))
            .await
            .unwrap();

        let tickers = history
            .get_ticker_prices("ATOMUSDT", now - Duration::seconds(60), now + Duration::seconds(60))
            .await
            .unwrap();

        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers[&ProviderName::Binance].len(), 2);
        assert_eq!(tickers[&ProviderName::Binance][0].price, dec!(34.69));
        assert_eq!(tickers[&ProviderName::Binance][1].price, dec!(34.71));
        assert_eq!(tickers[&ProviderName::Kraken][0].volume, dec!(90));
    }

    #[tokio::test]
    async fn test_duplicate_keys_are_skipped() {
        let history = in_memory().await;
        let pair = CurrencyPair::new("ATOM", "USDT");
        let now = Utc::now();

        history
            .add_ticker_price(&pair, ProviderName::Binance, &ticker("34.69", "100", now))
            .await
            .unwrap();
        // same (symbol, provider, time): the first row wins
        history
            .add_ticker_price(&pair, ProviderName::Binance, &ticker("99.99", "1", now))
            .await
            .unwrap();

        let tickers = history
            .get_ticker_prices("ATOMUSDT", now - Duration::seconds(1), now + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(tickers[&ProviderName::Binance].len(), 1);
        assert_eq!(tickers[&ProviderName::Binance][0].price, dec!(34.69));
    }

    #[tokio::test]
    async fn test_rows_before_window_are_pruned() {
        let history = in_memory().await;
        let pair = CurrencyPair::new("BTC", "USD");
        let now = Utc::now();

        history
            .add_ticker_price(
                &pair,
                ProviderName::Kraken,
                &ticker("29000", "1", now - Duration::hours(2)),
            )
            .await
            .unwrap();
        history
            .add_ticker_price(&pair, ProviderName::Kraken, &ticker("30000", "1", now))
            .await
            .unwrap();

        let tickers = history
            .get_ticker_prices("BTCUSD", now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(tickers[&ProviderName::Kraken].len(), 1);
        assert_eq!(tickers[&ProviderName::Kraken][0].price, dec!(30000));

        // querying the wider window no longer sees the pruned row
        let tickers = history
            .get_ticker_prices("BTCUSD", now - Duration::hours(3), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(tickers[&ProviderName::Kraken].len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_empty() {
        let history = in_memory().await;
        let now = Utc::now();
        let tickers = history
            .get_ticker_prices("FOOBAR", now - Duration::hours(1), now)
            .await
            .unwrap();
        assert!(tickers.is_empty());
    }
}
