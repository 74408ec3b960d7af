//! Simulated provider for local networks
//!
//! Each fetch perturbs the reference price by a random amount within
//! `jitter_bps`, so validators sharing a config still disagree slightly, the
//! way independent exchange reads do.

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use crate::oracle::sources::{Provider, ProviderError};
use crate::types::{CandlePrice, CurrencyPair, TickerPrice};

const CANDLE_COUNT: i64 = 5;
const CANDLE_SPACING_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    name: String,
    reference: BTreeMap<CurrencyPair, Decimal>,
    jitter_bps: u32,
}

impl SimulatedProvider {
    pub fn new(
        name: impl Into<String>,
        reference: BTreeMap<CurrencyPair, Decimal>,
        jitter_bps: u32,
    ) -> Self {
        Self {
            name: name.into(),
            reference,
            jitter_bps,
        }
    }

    fn jittered(&self, price: Decimal) -> Decimal {
        if self.jitter_bps == 0 {
            return price;
        }
        let bound = i64::from(self.jitter_bps);
        let bps = rand::thread_rng().gen_range(-bound..=bound);
        // price * (1 + bps / 10_000)
        let factor = Decimal::ONE + Decimal::new(bps, 4);
        (price * factor).round_dp(8).max(Decimal::ZERO)
    }

    fn volume(&self) -> Decimal {
        Decimal::from(rand::thread_rng().gen_range(100u32..10_000))
    }

    fn lookup(&self, pair: &CurrencyPair) -> Result<Decimal, ProviderError> {
        self.reference
            .get(pair)
            .copied()
            .ok_or_else(|| ProviderError::UnknownPair(pair.to_string()))
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ticker_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<HashMap<String, TickerPrice>, ProviderError> {
        let mut prices = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            let price = self.jittered(self.lookup(pair)?);
            prices.insert(
                pair.to_string(),
                TickerPrice {
                    price,
                    volume: self.volume(),
                },
            );
        }
        Ok(prices)
    }

    async fn candle_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<HashMap<String, Vec<CandlePrice>>, ProviderError> {
        let now = chrono::Utc::now().timestamp();
        let mut candles = HashMap::with_capacity(pairs.len());

        for pair in pairs {
            let reference = self.lookup(pair)?;
            let series = (0..CANDLE_COUNT)
                .rev()
                .map(|i| CandlePrice {
                    price: self.jittered(reference),
                    volume: self.volume(),
                    timestamp: now - i * CANDLE_SPACING_SECS,
                })
                .collect();
            candles.insert(pair.to_string(), series);
        }

        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn atom() -> CurrencyPair {
        CurrencyPair::new("ATOM", "USD").unwrap()
    }

    #[tokio::test]
    async fn test_prices_stay_within_jitter_band() {
        let provider = SimulatedProvider::new("sim", BTreeMap::from([(atom(), dec!(10))]), 100);

        for _ in 0..50 {
            let prices = provider.ticker_prices(&[atom()]).await.unwrap();
            let price = prices["ATOMUSD"].price;
            assert!(price >= dec!(9.9) && price <= dec!(10.1), "price {}", price);
        }
    }

    #[tokio::test]
    async fn test_candles_are_chronological() {
        let provider = SimulatedProvider::new("sim", BTreeMap::from([(atom(), dec!(10))]), 0);
        let candles = provider.candle_prices(&[atom()]).await.unwrap();
        let series = &candles["ATOMUSD"];

        assert_eq!(series.len(), CANDLE_COUNT as usize);
        assert!(series.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(series.iter().all(|c| c.price == dec!(10)));
    }

    #[tokio::test]
    async fn test_unknown_pair_errors() {
        let provider = SimulatedProvider::new("sim", BTreeMap::new(), 0);
        assert!(matches!(
            provider.ticker_prices(&[atom()]).await,
            Err(ProviderError::UnknownPair(_))
        ));
    }
}
