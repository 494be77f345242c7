//! Coinbase WebSocket client
//!
//! Subscribes to the matches and ticker channels; wire symbols are
//! dash-delimited (`ATOM-USDT`).

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

const COINBASE_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

#[derive(Debug, Clone, Serialize)]
struct CoinbaseSubscribeMsg {
    #[serde(rename = "type")]
    msg_type: String,
    product_ids: Vec<String>,
    channels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CoinbaseWsTickerMsg {
    #[serde(rename = "type")]
    msg_type: String,
    product_id: String,
    price: String,
    volume_24h: String,
}

pub struct CoinbaseProvider {
    pairs: Vec<CurrencyPair>,
    tickers: TickerSnapshot,
    counters: Counters,
}

impl CoinbaseProvider {
    pub fn new(pairs: Vec<CurrencyPair>, counters: Counters) -> Self {
        Self {
            pairs,
            tickers: TickerSnapshot::default(),
            counters,
        }
    }

    fn wire_symbol(pair: &CurrencyPair) -> String {
        format!("{}-{}", pair.base, pair.quote)
    }

    fn handle_message(&self, text: &str) {
        let msg: CoinbaseWsTickerMsg = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(_) => return,
        };
        if msg.msg_type != "ticker" {
            return;
        }
        match TickerPrice::new(&msg.price, &msg.volume_24h, Utc::now()) {
            Ok(ticker) => self.tickers.set(msg.product_id, ticker),
            Err(e) => {
                Counters::incr(&self.counters.input_errors);
                warn!(source = %"coinbase", symbol = %msg.product_id, error = %e, "discarding ticker");
            }
        }
    }

    #[cfg(test)]
    fn snapshot(&self) -> &TickerSnapshot {
        &self.tickers
    }
}

#[async_trait]
impl Provider for CoinbaseProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Coinbase
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
        let msg = CoinbaseSubscribeMsg {
            msg_type: "subscribe".to_string(),
            product_ids: pairs.iter().map(Self::wire_symbol).collect(),
            channels: vec!["matches".to_string(), "ticker".to_string()],
        };
        Ok(vec![serde_json::to_string(&msg)?])
    }

    async fn connect(&self) -> Result<()> {
        if self.pairs.is_empty() {
            bail!("No subscriptions configured for Coinbase");
        }

        info!(source = %"coinbase", url = %COINBASE_WS_URL, "Connecting to Coinbase WebSocket...");
        let (ws_stream, _) = connect_async(COINBASE_WS_URL).await?;
        let (mut write, mut read) = ws_stream.split();

        for msg in self.get_subscription_messages(&self.pairs)? {
            write.send(Message::Text(msg)).await?;
        }
        info!(source = %"coinbase", pairs = self.pairs.len(), "Connected to Coinbase WebSocket");

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => self.handle_message(&text),
                Ok(Message::Ping(data)) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => {
                    warn!(source = %"coinbase", "Connection closed by server");
                    break;
                }
                Err(e) => {
                    warn!(source = %"coinbase", error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        Ok(())
    }
}
