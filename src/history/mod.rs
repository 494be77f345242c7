//! Price history - sqlite-backed ticker archive
//!
//! Append-only store keyed by `(symbol, provider, time)`. The oracle hands
//! every snapshot observation to the sink each tick; duplicate keys are
//! skipped, and queries prune rows older than their window before reading.

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::decimal::canonical_string;
use crate::types::{CurrencyPair, ProviderName, TickerPrice};

pub struct PriceHistory {
    pool: SqlitePool,
}

impl PriceHistory {
    /// Open (or create) the archive at `path` and ensure the schema exists.
    pub async fn new(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .with_context(|| format!("invalid sqlite path {path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("failed to open sqlite db")?;
        let history = Self { pool };
        history.init().await?;
        Ok(history)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS crypto_ticker_prices(
                symbol TEXT NOT NULL,
                provider TEXT NOT NULL,
                time INT NOT NULL,
                price TEXT NOT NULL,
                volume TEXT NOT NULL,
                CONSTRAINT id PRIMARY KEY (symbol, provider, time)
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create db table")?;
        Ok(())
    }

    /// Insert one observation; rows whose key already exists are skipped.
    pub async fn add_ticker_price(
        &self,
        pair: &CurrencyPair,
        provider: ProviderName,
        ticker: &TickerPrice,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crypto_ticker_prices(symbol, provider, time, price, volume)
            SELECT ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM crypto_ticker_prices WHERE symbol = ? AND provider = ? AND time = ?
            )
        "#,
        )
        .bind(pair.key())
        .bind(provider.to_string())
        .bind(ticker.time.timestamp())
        .bind(canonical_string(ticker.price))
        .bind(canonical_string(ticker.volume))
        .bind(pair.key())
        .bind(provider.to_string())
        .bind(ticker.time.timestamp())
        .execute(&self.pool)
        .await
        .context("failed to store ticker")?;
        Ok(())
    }

    /// Tickers for `symbol` within `[start, end]`, grouped per provider and
    /// ordered by time. Rows older than `start` are deleted first.
    pub async fn get_ticker_prices(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<ProviderName, Vec<TickerPrice>>> {
        sqlx::query("DELETE FROM crypto_ticker_prices WHERE symbol = ? AND time < ?")
            .bind(symbol)
            .bind(start.timestamp())
            .execute(&self.pool)
            .await
            .context("failed to remove old ticker prices")?;

        let rows = sqlx::query(
            r#"
            SELECT provider, time, price, volume FROM crypto_ticker_prices
            WHERE symbol = ? AND time BETWEEN ? AND ?
            ORDER BY time ASC
        "#,
        )
        .bind(symbol)
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_all(&self.pool)
        .await
        .context("failed to query stored ticker prices")?;

        let mut tickers: BTreeMap<ProviderName, Vec<TickerPrice>> = BTreeMap::new();
        for row in rows {
            let provider_str: String = row.get("provider");
            let epoch: i64 = row.get("time");
            let price: String = row.get("price");
            let volume: String = row.get("volume");

            let Some(provider) = ProviderName::from_str(&provider_str) else {
                warn!(symbol, provider = %provider_str, "unknown provider in history row");
                continue;
            };
            let time = Utc
                .timestamp_opt(epoch, 0)
                .single()
                .unwrap_or_else(Utc::now);
            let ticker = match TickerPrice::new(&price, &volume, time) {
                Ok(ticker) => ticker,
                Err(e) => {
                    warn!(symbol, provider = %provider_str, error = %e, "corrupt history row");
                    continue;
                }
            };
            tickers.entry(provider).or_default().push(ticker);
        }
        Ok(tickers)
    }
}
