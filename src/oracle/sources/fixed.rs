//! Provider that always returns the same prices

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use crate::oracle::sources::{Provider, ProviderError};
use crate::types::{CandlePrice, CurrencyPair, TickerPrice};

#[derive(Debug, Clone)]
pub struct FixedProvider {
    name: String,
    tickers: HashMap<String, TickerPrice>,
    candles: HashMap<String, Vec<CandlePrice>>,
}

impl FixedProvider {
    pub fn new(
        name: impl Into<String>,
        tickers: HashMap<String, TickerPrice>,
        candles: HashMap<String, Vec<CandlePrice>>,
    ) -> Self {
        Self {
            name: name.into(),
            tickers,
            candles,
        }
    }

    /// Ticker-only provider with unit volume and no candles
    pub fn from_prices(name: impl Into<String>, prices: BTreeMap<CurrencyPair, Decimal>) -> Self {
        let tickers = prices
            .into_iter()
            .map(|(pair, price)| {
                (
                    pair.to_string(),
                    TickerPrice {
                        price,
                        volume: Decimal::ONE,
                    },
                )
            })
            .collect();
        Self::new(name, tickers, HashMap::new())
    }
}

#[async_trait]
impl Provider for FixedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ticker_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<HashMap<String, TickerPrice>, ProviderError> {
        Ok(pairs
            .iter()
            .filter_map(|p| {
                let key = p.to_string();
                self.tickers.get(&key).map(|t| (key, *t))
            })
            .collect())
    }

    async fn candle_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<HashMap<String, Vec<CandlePrice>>, ProviderError> {
        Ok(pairs
            .iter()
            .filter_map(|p| {
                let key = p.to_string();
                self.candles.get(&key).map(|c| (key, c.clone()))
            })
            .collect())
    }
}
