//! Provider Aggregator - Collects per-provider prices and candles for one height
//!
//! Provider fetch tasks merge their results here concurrently. Once every task
//! settled, the extend-vote engine turns the snapshot into one canonical price
//! per base asset.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use crate::oracle::candles::compute_tvwap;
use crate::types::{
    AggregatedProviderCandles, AggregatedProviderPrices, CandlePrice, CurrencyPair, PriceMap,
    TickerPrice,
};

/// Decimal places kept in canonical prices
pub const PRICE_DECIMALS: u32 = 8;

#[derive(Debug, Default)]
struct AggregatorState {
    prices: AggregatedProviderPrices,
    candles: AggregatedProviderCandles,
}

/// Thread-safe accumulator for provider results.
///
/// Created fresh for every height and shared only with that height's fetch tasks.
#[derive(Debug, Default)]
pub struct ProviderAggregator {
    state: Mutex<AggregatorState>,
}

impl ProviderAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the ticker and candles found for `pair` under `provider -> pair.base`.
    ///
    /// Returns true if at least one of the two was present.
    pub fn record_provider_result(
        &self,
        provider: &str,
        prices: &HashMap<String, TickerPrice>,
        candles: &HashMap<String, Vec<CandlePrice>>,
        pair: &CurrencyPair,
    ) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let key = pair.to_string();

        let ticker = prices.get(&key).copied();
        let provider_prices = state.prices.entry(provider.to_string()).or_default();
        if let Some(ticker) = ticker {
            provider_prices.insert(pair.base.clone(), ticker);
        }

        let series = candles.get(&key).cloned();
        let provider_candles = state.candles.entry(provider.to_string()).or_default();
        let found_candles = series.is_some();
        if let Some(series) = series {
            provider_candles.insert(pair.base.clone(), series);
        }

        ticker.is_some() || found_candles
    }

    /// Owned copies of the accumulated maps
    pub fn snapshot(&self) -> (AggregatedProviderPrices, AggregatedProviderCandles) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (state.prices.clone(), state.candles.clone())
    }

    /// Compute one canonical price per base from everything recorded so far
    pub fn compute_prices(&self, now: i64, candle_window: i64) -> PriceMap {
        let (prices, candles) = self.snapshot();
        compute_oracle_prices(&prices, &candles, now, candle_window)
    }
}

/// Volume weighted average of ticker prices.
///
/// Falls back to the arithmetic mean when every volume is zero.
pub fn compute_vwap<'a, I>(tickers: I) -> Option<Decimal>
where
    I: IntoIterator<Item = &'a TickerPrice>,
{
    let mut weighted_sum = Decimal::ZERO;
    let mut total_volume = Decimal::ZERO;
    let mut plain_sum = Decimal::ZERO;
    let mut count = 0u32;

    for ticker in tickers {
        if ticker.price.is_sign_negative() || ticker.volume.is_sign_negative() {
            continue;
        }
        weighted_sum = weighted_sum.checked_add(ticker.price.checked_mul(ticker.volume)?)?;
        total_volume = total_volume.checked_add(ticker.volume)?;
        plain_sum = plain_sum.checked_add(ticker.price)?;
        count += 1;
    }

    if count == 0 {
        return None;
    }
    if total_volume.is_zero() {
        return plain_sum.checked_div(Decimal::from(count));
    }
    weighted_sum.checked_div(total_volume)
}

/// Canonical price policy: TVWAP over all providers' candles, VWAP over
/// tickers when no candle volume is usable. Bases with no data are omitted.
pub fn compute_oracle_prices(
    prices: &AggregatedProviderPrices,
    candles: &AggregatedProviderCandles,
    now: i64,
    candle_window: i64,
) -> PriceMap {
    let bases: HashSet<&String> = prices
        .values()
        .flat_map(|by_base| by_base.keys())
        .chain(candles.values().flat_map(|by_base| by_base.keys()))
        .collect();

    let mut computed = PriceMap::new();

    for base in bases {
        let base_candles = candles
            .values()
            .filter_map(|by_base| by_base.get(base))
            .flatten();

        let price = compute_tvwap(base_candles, now, candle_window).or_else(|| {
            compute_vwap(prices.values().filter_map(|by_base| by_base.get(base)))
        });

        match price {
            Some(price) => {
                computed.insert(base.clone(), price.round_dp(PRICE_DECIMALS));
            }
            None => {
                tracing::debug!(base = %base, "No usable provider data for base");
            }
        }
    }

    computed
}
