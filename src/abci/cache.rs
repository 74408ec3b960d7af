use std::collections::BTreeMap;

use crate::types::PriceMap;

/// Prices this validator computed in ExtendVote, kept for the last few heights
/// so incoming attestations can be compared against them.
#[derive(Debug, Clone)]
pub struct ComputedPriceCache {
    retention: usize,
    by_height: BTreeMap<i64, PriceMap>,
}

impl ComputedPriceCache {
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            by_height: BTreeMap::new(),
        }
    }

    /// Insert and evict the oldest heights beyond the retention bound
    pub fn insert(&mut self, height: i64, prices: PriceMap) {
        self.by_height.insert(height, prices);
        while self.by_height.len() > self.retention {
            self.by_height.pop_first();
        }
    }

    pub fn get(&self, height: i64) -> Option<&PriceMap> {
        self.by_height.get(&height)
    }

    /// Own prices for `height`, else for `height - 1`
    pub fn reference_for(&self, height: i64) -> Option<&PriceMap> {
        self.get(height).or_else(|| self.get(height - 1))
    }

    pub fn len(&self) -> usize {
        self.by_height.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_height.is_empty()
    }
}
