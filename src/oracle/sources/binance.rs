//! Binance REST provider
//!
//! Reads 24h tickers and 1m klines from the Binance spot API. Pair symbols use
//! the canonical concatenated form (ATOMUSDT).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::oracle::sources::{Provider, ProviderError};
use crate::types::{CandlePrice, CurrencyPair, TickerPrice};

const BINANCE_REST_URL: &str = "https://api.binance.com";
const KLINE_INTERVAL: &str = "1m";
const HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker {
    symbol: String,
    last_price: String,
    volume: String,
}

#[derive(Debug, Clone)]
pub struct BinanceProvider {
    name: String,
    base_url: String,
    candle_limit: usize,
    client: reqwest::Client,
}

impl BinanceProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: Option<String>,
        candle_limit: usize,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.unwrap_or_else(|| BINANCE_REST_URL.to_string()),
            candle_limit: candle_limit.max(1),
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let response = self.client.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Provider for BinanceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ticker_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<HashMap<String, TickerPrice>, ProviderError> {
        if pairs.is_empty() {
            return Ok(HashMap::new());
        }

        let symbols: Vec<String> = pairs.iter().map(|p| p.to_string()).collect();
        let symbols = serde_json::to_string(&symbols)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let tickers: Vec<BinanceTicker> = self
            .get_json("/api/v3/ticker/24hr", &[("symbols", symbols)])
            .await?;

        tracing::debug!(provider = %self.name, count = tickers.len(), "Fetched tickers");
        parse_tickers(&tickers, pairs)
    }

    async fn candle_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<HashMap<String, Vec<CandlePrice>>, ProviderError> {
        let mut candles = HashMap::with_capacity(pairs.len());
        let now = chrono::Utc::now().timestamp();

        for pair in pairs {
            let klines: Vec<Vec<serde_json::Value>> = self
                .get_json(
                    "/api/v3/klines",
                    &[
                        ("symbol", pair.to_string()),
                        ("interval", KLINE_INTERVAL.to_string()),
                        ("limit", self.candle_limit.to_string()),
                    ],
                )
                .await?;

            candles.insert(pair.to_string(), parse_klines(&klines, now)?);
        }

        Ok(candles)
    }
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, ProviderError> {
    Decimal::from_str(raw).map_err(|e| ProviderError::Malformed(format!("{}: {}", field, e)))
}

fn parse_tickers(
    tickers: &[BinanceTicker],
    pairs: &[CurrencyPair],
) -> Result<HashMap<String, TickerPrice>, ProviderError> {
    let mut prices = HashMap::with_capacity(tickers.len());

    for ticker in tickers {
        let Some(pair) = pairs.iter().find(|p| p.to_string() == ticker.symbol) else {
            continue;
        };
        prices.insert(
            pair.to_string(),
            TickerPrice {
                price: parse_decimal(&ticker.last_price, "lastPrice")?,
                volume: parse_decimal(&ticker.volume, "volume")?,
            },
        );
    }

    Ok(prices)
}

/// Kline layout: [open_time, open, high, low, close, volume, close_time, ...]
///
/// The newest kline is still open and its close_time lies in the future, so
/// timestamps are capped at `now`.
fn parse_klines(
    klines: &[Vec<serde_json::Value>],
    now: i64,
) -> Result<Vec<CandlePrice>, ProviderError> {
    klines
        .iter()
        .map(|kline| {
            if kline.len() < 7 {
                return Err(ProviderError::Malformed(format!(
                    "kline has {} fields",
                    kline.len()
                )));
            }

            let close = kline[4]
                .as_str()
                .ok_or_else(|| ProviderError::Malformed("close".to_string()))?;
            let volume = kline[5]
                .as_str()
                .ok_or_else(|| ProviderError::Malformed("volume".to_string()))?;
            let close_time = kline[6]
                .as_i64()
                .ok_or_else(|| ProviderError::Malformed("close_time".to_string()))?;

            Ok(CandlePrice {
                price: parse_decimal(close, "close")?,
                volume: parse_decimal(volume, "volume")?,
                timestamp: (close_time / 1000).min(now),
            })
        })
        .collect()
}
