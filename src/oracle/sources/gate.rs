//! Gate.io WebSocket client
//!
//! Wire symbols are underscore-delimited (`ATOM_USDT`); ticker updates
//! arrive as `ticker.update` notifications.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::error::TickerError;
use crate::metrics::Counters;
use crate::types::{CurrencyPair, ProviderName, TickerPrice};

use super::{ticker_prices_from_snapshot, Provider, TickerSnapshot};

const GATE_WS_URL: &str = "wss://ws.gate.io/v3/";

#[derive(Debug, Clone, Serialize)]
struct GateSubscribeMsg {
    method: String,
    params: Vec<String>,
    id: u32,
}

/// `ticker.update` notification: `params` carries the wire symbol followed
/// by the ticker body.
#[derive(Debug, Clone, Deserialize)]
struct GateTickerUpdate {
    method: String,
    params: (String, GateTicker),
}

#[derive(Debug, Clone, Deserialize)]
struct GateTicker {
    last: String,
    #[serde(rename = "baseVolume")]
    base_volume: String,
}

pub struct GateProvider {
    pairs: Vec<CurrencyPair>,
    tickers: TickerSnapshot,
    counters: Counters,
}

impl GateProvider {
    pub fn new(pairs: Vec<CurrencyPair>, counters: Counters) -> Self {
        Self {
            pairs,
            tickers: TickerSnapshot::default(),
            counters,
        }
    }

    fn wire_symbol(pair: &CurrencyPair) -> String {
        format!("{}_{}", pair.base, pair.quote)
    }

    fn handle_message(&self, text: &str) {
        let msg: GateTickerUpdate = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(_) => return,
        };
        if msg.method != "ticker.update" {
            return;
        }
        let (symbol, ticker) = msg.params;
        match TickerPrice::new(&ticker.last, &ticker.base_volume, Utc::now()) {
            Ok(ticker) => self.tickers.set(symbol, ticker),
            Err(e) => {
                Counters::incr(&self.counters.input_errors);
                warn!(source = %"gate", symbol = %symbol, error = %e, "discarding ticker");
            }
        }
    }
}

#[async_trait]
impl Provider for GateProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Gate
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
        let msg = GateSubscribeMsg {
            method: "ticker.subscribe".to_string(),
            params: pairs.iter().map(Self::wire_symbol).collect(),
            id: 1,
        };
        Ok(vec![serde_json::to_string(&msg)?])
    }

    async fn connect(&self) -> Result<()> {
        if self.pairs.is_empty() {
            bail!("No subscriptions configured for Gate");
        }

        info!(source = %"gate", url = %GATE_WS_URL, "Connecting to Gate WebSocket...");
        let (ws_stream, _) = connect_async(GATE_WS_URL).await?;
        let (mut write, mut read) = ws_stream.split();

        for msg in self.get_subscription_messages(&self.pairs)? {
            write.send(Message::Text(msg)).await?;
        }
        info!(source = %"gate", pairs = self.pairs.len(), "Connected to Gate WebSocket");

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => self.handle_message(&text),
                Ok(Message::Ping(data)) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => {
                    warn!(source = %"gate", "Connection closed by server");
                    break;
                }
                Err(e) => {
                    warn!(source = %"gate", error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn provider() -> GateProvider {
        GateProvider::new(vec![CurrencyPair::new("ATOM", "USDT")], Counters::default())
    }

    #[test]
    fn test_subscription_message() {
        let msgs = provider()
            .get_subscription_messages(&[CurrencyPair::new("ATOM", "USDT")])
            .unwrap();
        assert_eq!(
            msgs,
            vec![r#"{"method":"ticker.subscribe","params":["ATOM_USDT"],"id":1}"#]
        );
    }

    #[test]
    fn test_get_ticker_prices_single() {
        let p = provider();
        p.handle_message(
            r#"{"method":"ticker.update","params":["ATOM_USDT",{"last":"34.69000000","baseVolume":"2396974.02000000"}],"id":null}"#,
        );

        let prices = p
            .get_ticker_prices(&[CurrencyPair::new("ATOM", "USDT")])
            .unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["ATOMUSDT"].price, dec!(34.69));
        assert_eq!(prices["ATOMUSDT"].volume, dec!(2396974.02));
    }

    #[test]
    fn test_get_ticker_prices_multi() {
        let p = provider();
        p.handle_message(
            r#"{"method":"ticker.update","params":["ATOM_USDT",{"last":"34.69000000","baseVolume":"2396974.02000000"}]}"#,
        );
        p.handle_message(
            r#"{"method":"ticker.update","params":["UMEE_USDT",{"last":"41.35000000","baseVolume":"2396974.02000000"}]}"#,
        );

        let prices = p
            .get_ticker_prices(&[
                CurrencyPair::new("ATOM", "USDT"),
                CurrencyPair::new("UMEE", "USDT"),
            ])
            .unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["ATOMUSDT"].price, dec!(34.69));
        assert_eq!(prices["UMEEUSDT"].price, dec!(41.35));
    }

    #[test]
    fn test_missing_ticker_error() {
        let err = provider()
            .get_ticker_prices(&[CurrencyPair::new("FOO", "BAR")])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "gate failed to get ticker price for FOO_BAR"
        );
    }
}
