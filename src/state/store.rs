use rust_decimal::Decimal;
use std::sync::{PoisonError, RwLock};

use crate::error::Result;
use crate::types::PriceMap;

/// Durable oracle state written once per height on proposal acceptance
pub trait OracleStore: Send + Sync {
    fn set_oracle_prices(&self, height: i64, prices: &PriceMap) -> Result<()>;

    /// Latest committed prices
    fn prices(&self) -> PriceMap;

    fn price(&self, base: &str) -> Option<Decimal> {
        self.prices().get(base).copied()
    }

    /// Height of the latest commit, if any
    fn last_height(&self) -> Option<i64>;
}

#[derive(Debug, Default)]
struct StoreState {
    height: Option<i64>,
    prices: PriceMap,
}

/// Process-local store, used by the simulator and tests
#[derive(Debug, Default)]
pub struct InMemoryOracleStore {
    state: RwLock<StoreState>,
}

impl InMemoryOracleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OracleStore for InMemoryOracleStore {
    fn set_oracle_prices(&self, height: i64, prices: &PriceMap) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.height = Some(height);
        state.prices = prices.clone();
        Ok(())
    }

    fn prices(&self) -> PriceMap {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .prices
            .clone()
    }

    fn last_height(&self) -> Option<i64> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .height
    }
}
