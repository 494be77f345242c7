//! Binance WebSocket client for real-time ticker data
//!
//! Subscribes to the 24h ticker stream for each configured pair and keeps
//! the latest last-price/volume per symbol.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::error::TickerError;
use crate::metrics::Counters;
use crate::types::{CurrencyPair, ProviderName, TickerPrice};

use super::{ticker_prices_from_snapshot, Provider, TickerSnapshot};

const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/ws";

#[derive(Debug, Clone, Serialize)]
struct BinanceSubscribeMsg {
    method: String,
    params: Vec<String>,
    id: u32,
}

/// 24h rolling ticker event.
#[derive(Debug, Clone, Deserialize)]
struct BinanceTickerMsg {
    #[serde(rename = "s")]
    symbol: String,
    /// Last traded price.
    #[serde(rename = "c")]
    last_price: String,
    /// 24h base asset volume.
    #[serde(rename = "v")]
    volume: String,
}

pub struct BinanceProvider {
    pairs: Vec<CurrencyPair>,
    tickers: TickerSnapshot,
    counters: Counters,
    reconnect_delay: Duration,
}

impl BinanceProvider {
    pub fn new(pairs: Vec<CurrencyPair>, counters: Counters, reconnect_delay: Duration) -> Self {
        Self {
            pairs,
            tickers: TickerSnapshot::default(),
            counters,
            reconnect_delay,
        }
    }

    /// Binance keys tickers by uppercase concatenation (`ATOMUSDT`); stream
    /// names are the lowercase form.
    fn wire_symbol(pair: &CurrencyPair) -> String {
        format!("{}{}", pair.base, pair.quote)
    }

    fn stream_name(pair: &CurrencyPair) -> String {
        format!("{}@ticker", Self::wire_symbol(pair).to_lowercase())
    }

    fn handle_message(&self, text: &str) {
        let msg: BinanceTickerMsg = match serde_json::from_str(text) {
            Ok(msg) => msg,
            // subscribe acks and other control frames land here
            Err(_) => return,
        };
        match TickerPrice::new(&msg.last_price, &msg.volume, Utc::now()) {
            Ok(ticker) => self.tickers.set(msg.symbol, ticker),
            Err(e) => {
                Counters::incr(&self.counters.input_errors);
                warn!(source = %"binance", symbol = %msg.symbol, error = %e, "discarding ticker");
            }
        }
    }

    #[cfg(test)]
    fn snapshot(&self) -> &TickerSnapshot {
        &self.tickers
    }
}

#[async_trait]
impl Provider for BinanceProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Binance
    }

    fn get_ticker_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<BTreeMap<String, TickerPrice>, TickerError> {
        ticker_prices_from_snapshot(self.name(), &self.tickers, pairs, Self::wire_symbol)
    }

    fn get_subscription_messages(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<Vec<String>, serde_json::Error> {
        let msg = BinanceSubscribeMsg {
            method: "SUBSCRIBE".to_string(),
            params: pairs.iter().map(Self::stream_name).collect(),
            id: 1,
        };
        Ok(vec![serde_json::to_string(&msg)?])
    }

    async fn connect(&self) -> Result<()> {
        if self.pairs.is_empty() {
            bail!("No subscriptions configured for Binance");
        }

        let mut reconnect_attempts = 0u32;
        let max_reconnect_attempts = 10u32;
        let max_delay = Duration::from_secs(60);

        loop {
            info!(source = %"binance", url = %BINANCE_WS_URL, attempt = reconnect_attempts, "Connecting to Binance WebSocket...");

            let (ws_stream, _) = match connect_async(BINANCE_WS_URL).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(source = %"binance", error = %e, "Connection failed");
                    reconnect_attempts += 1;
                    if reconnect_attempts >= max_reconnect_attempts {
                        bail!("Max reconnection attempts ({}) reached", max_reconnect_attempts);
                    }
                    let delay = std::cmp::min(self.reconnect_delay * reconnect_attempts, max_delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let (mut write, mut read) = ws_stream.split();
            reconnect_attempts = 0;

            for msg in self
                .get_subscription_messages(&self.pairs)
                .context("Failed to build Binance subscription messages")?
            {
                write.send(Message::Text(msg)).await?;
            }
            info!(source = %"binance", pairs = self.pairs.len(), "Connected to Binance WebSocket");

            let should_reconnect = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => self.handle_message(&text),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        warn!(source = %"binance", "Connection closed by server");
                        break true;
                    }
                    Some(Err(e)) => {
                        warn!(source = %"binance", error = %e, "WebSocket error");
                        break true;
                    }
                    None => {
                        warn!(source = %"binance", "Stream ended");
                        break true;
                    }
                    _ => {}
                }
            };

            if !should_reconnect {
                return Ok(());
            }
            reconnect_attempts += 1;
            if reconnect_attempts > max_reconnect_attempts {
                bail!("Max reconnection attempts ({}) reached", max_reconnect_attempts);
            }
            let delay = std::cmp::min(self.reconnect_delay * reconnect_attempts, max_delay);
            info!(source = %"binance", delay_secs = delay.as_secs(), "Reconnecting...");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn provider() -> BinanceProvider {
        BinanceProvider::new(
            vec![CurrencyPair::new("ATOM", "USDT")],
            Counters::default(),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_subscription_message() {
        let msgs = provider()
            .get_subscription_messages(&[CurrencyPair::new("ATOM", "USDT")])
            .unwrap();
        assert_eq!(
            msgs,
            vec![r#"{"method":"SUBSCRIBE","params":["atomusdt@ticker"],"id":1}"#]
        );
    }

    #[test]
    fn test_get_ticker_prices() {
        let p = provider();
        p.handle_message(r#"{"s":"ATOMUSDT","c":"34.69000000","v":"2396974.02000000"}"#);

        let prices = p
            .get_ticker_prices(&[CurrencyPair::new("ATOM", "USDT")])
            .unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["ATOMUSDT"].price, dec!(34.69));
        assert_eq!(prices["ATOMUSDT"].volume, dec!(2396974.02));
    }

    #[test]
    fn test_missing_ticker_error() {
        let err = provider()
            .get_ticker_prices(&[CurrencyPair::new("FOO", "BAR")])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "binance failed to get ticker price for FOOBAR"
        );
    }

    #[test]
    fn test_malformed_ticker_is_dropped() {
        let p = provider();
        p.handle_message(r#"{"s":"ATOMUSDT","c":"oops","v":"1"}"#);
        assert!(p.snapshot().get("ATOMUSDT").is_none());
        assert_eq!(Counters::read(&p.counters.input_errors), 1);
    }
}
