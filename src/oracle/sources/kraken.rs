//! Kraken WebSocket client
//!
//! Wire symbols are slash-delimited (`ATOM/USDT`). Ticker updates arrive as
//! array frames `[channel_id, body, "ticker", "<pair>"]`, so parsing goes
//! through `serde_json::Value` rather than a typed frame.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::error::TickerError;
use crate::metrics::Counters;
use crate::types::{CurrencyPair, ProviderName, TickerPrice};

use super::{ticker_prices_from_snapshot, Provider, TickerSnapshot};

const KRAKEN_WS_URL: &str = "wss://ws.kraken.com";

#[derive(Debug, Clone, Serialize)]
struct KrakenSubscribeMsg {
    event: String,
    pair: Vec<String>,
    subscription: KrakenSubscription,
}

#[derive(Debug, Clone, Serialize)]
struct KrakenSubscription {
    name: String,
}

pub struct KrakenProvider {
    pairs: Vec<CurrencyPair>,
    tickers: TickerSnapshot,
    counters: Counters,
    reconnect_delay: Duration,
}

impl KrakenProvider {
    pub fn new(pairs: Vec<CurrencyPair>, counters: Counters, reconnect_delay: Duration) -> Self {
        Self {
            pairs,
            tickers: TickerSnapshot::default(),
            counters,
            reconnect_delay,
        }
    }

    fn wire_symbol(pair: &CurrencyPair) -> String {
        format!("{}/{}", pair.base, pair.quote)
    }

    /// Ticker frames: `[id, {"c":[last, ...], "v":[today, last24h]}, "ticker", pair]`.
    fn handle_message(&self, text: &str) {
        let frame: Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(_) => return,
        };
        let Some(parts) = frame.as_array() else {
            // event objects (heartbeats, subscription acks)
            return;
        };
        if parts.len() != 4 || parts[2].as_str() != Some("ticker") {
            return;
        }
        let Some(symbol) = parts[3].as_str() else {
            return;
        };
        let last_price = parts[1].pointer("/c/0").and_then(Value::as_str);
        let volume = parts[1].pointer("/v/1").and_then(Value::as_str);
        let (Some(last_price), Some(volume)) = (last_price, volume) else {
            return;
        };
        match TickerPrice::new(last_price, volume, Utc::now()) {
            Ok(ticker) => self.tickers.set(symbol.to_string(), ticker),
            Err(e) => {
                Counters::incr(&self.counters.input_errors);
                warn!(source = %"kraken", symbol = %symbol, error = %e, "discarding ticker");
            }
        }
    }
}

#[async_trait]
impl Provider for KrakenProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Kraken
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
        let msg = KrakenSubscribeMsg {
            event: "subscribe".to_string(),
            pair: pairs.iter().map(Self::wire_symbol).collect(),
            subscription: KrakenSubscription {
                name: "ticker".to_string(),
            },
        };
        Ok(vec![serde_json::to_string(&msg)?])
    }

    async fn connect(&self) -> Result<()> {
        if self.pairs.is_empty() {
            bail!("No subscriptions configured for Kraken");
        }

        let mut reconnect_attempts = 0u32;
        let max_reconnect_attempts = 10u32;
        let max_delay = Duration::from_secs(60);

        loop {
            info!(source = %"kraken", url = %KRAKEN_WS_URL, attempt = reconnect_attempts, "Connecting to Kraken WebSocket...");

            let (ws_stream, _) = match connect_async(KRAKEN_WS_URL).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(source = %"kraken", error = %e, "Connection failed");
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

            for msg in self.get_subscription_messages(&self.pairs)? {
                write.send(Message::Text(msg)).await?;
            }
            info!(source = %"kraken", pairs = self.pairs.len(), "Connected to Kraken WebSocket");

            let should_reconnect = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => self.handle_message(&text),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        warn!(source = %"kraken", "Connection closed by server");
                        break true;
                    }
                    Some(Err(e)) => {
                        warn!(source = %"kraken", error = %e, "WebSocket error");
                        break true;
                    }
                    None => {
                        warn!(source = %"kraken", "Stream ended");
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
            info!(source = %"kraken", delay_secs = delay.as_secs(), "Reconnecting...");
            tokio::time::sleep(delay).await;
        }
    }
}
