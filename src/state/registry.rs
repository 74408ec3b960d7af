use std::collections::BTreeSet;

use crate::types::CurrencyPair;

/// Read-only view of the pairs the chain produces prices for
pub trait PairRegistry: Send + Sync {
    fn supported_pairs(&self) -> Vec<CurrencyPair>;

    /// Bases that must carry a price every height
    fn required_bases(&self) -> BTreeSet<String> {
        self.supported_pairs().into_iter().map(|p| p.base).collect()
    }
}

/// Registry backed by a fixed list (e.g. from genesis or config)
#[derive(Debug, Clone, Default)]
pub struct StaticPairRegistry {
    pairs: Vec<CurrencyPair>,
}

impl StaticPairRegistry {
    pub fn new(pairs: Vec<CurrencyPair>) -> Self {
        Self { pairs }
    }
}

impl PairRegistry for StaticPairRegistry {
    fn supported_pairs(&self) -> Vec<CurrencyPair> {
        self.pairs.clone()
    }
}
