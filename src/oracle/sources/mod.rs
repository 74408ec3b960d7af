//! Price provider implementations (Binance, simulated, fixed)

mod binance;
mod fixed;
mod simulated;

pub use binance::BinanceProvider;
pub use fixed::FixedProvider;
pub use simulated::SimulatedProvider;

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ProviderConfig, ProviderKind};
use crate::types::{CandlePrice, CurrencyPair, TickerPrice};

/// Errors reported by a single provider fetch
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("malformed provider payload: {0}")]
    Malformed(String),

    #[error("provider does not quote {0}")]
    UnknownPair(String),

    #[error("fetch task aborted: {0}")]
    Task(String),
}

/// Capability shared by every price provider.
///
/// Result maps are keyed by the pair's canonical string (`CurrencyPair::to_string`).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Latest trade price and rolling volume per pair
    async fn ticker_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<HashMap<String, TickerPrice>, ProviderError>;

    /// Recent trade candles per pair, oldest first
    async fn candle_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> Result<HashMap<String, Vec<CandlePrice>>, ProviderError>;
}

/// A provider together with the pairs it is asked for
#[derive(Clone)]
pub struct RegisteredProvider {
    pub provider: Arc<dyn Provider>,
    pub pairs: Vec<CurrencyPair>,
}

/// Name-keyed table of configured providers
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name, replacing any previous entry
    pub fn register(&mut self, provider: Arc<dyn Provider>, pairs: Vec<CurrencyPair>) {
        let name = provider.name().to_string();
        self.register_as(name, provider, pairs);
    }

    /// Register a provider under an explicit name
    pub fn register_as(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        pairs: Vec<CurrencyPair>,
    ) {
        self.providers
            .insert(name.into(), RegisteredProvider { provider, pairs });
    }

    /// Union of the bases across every provider's configured pairs
    pub fn required_bases(&self) -> BTreeSet<String> {
        self.providers
            .values()
            .flat_map(|entry| entry.pairs.iter().map(|p| p.base.clone()))
            .collect()
    }

    /// Build providers from configuration
    pub fn from_config(configs: &[ProviderConfig]) -> anyhow::Result<Self> {
        let mut registry = Self::new();

        for cfg in configs {
            let pairs = cfg.currency_pairs()?;
            let provider: Arc<dyn Provider> = match cfg.kind {
                ProviderKind::Binance => Arc::new(BinanceProvider::new(
                    cfg.name.clone(),
                    cfg.base_url.clone(),
                    cfg.candle_limit,
                )?),
                ProviderKind::Simulated => Arc::new(SimulatedProvider::new(
                    cfg.name.clone(),
                    cfg.reference_prices()?,
                    cfg.jitter_bps,
                )),
                ProviderKind::Fixed => {
                    Arc::new(FixedProvider::from_prices(cfg.name.clone(), cfg.reference_prices()?))
                }
            };

            tracing::info!(
                provider = %cfg.name,
                kind = ?cfg.kind,
                pairs = pairs.len(),
                "Registered price provider"
            );
            registry.register(provider, pairs);
        }

        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredProvider> {
        self.providers.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RegisteredProvider)> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_registry_keys_by_provider_name() {
        let mut registry = ProviderRegistry::new();
        let pair = CurrencyPair::new("ATOM", "USD").unwrap();

        registry.register(
            Arc::new(FixedProvider::from_prices(
                "alpha",
                BTreeMap::from([(pair.clone(), dec!(10))]),
            )),
            vec![pair.clone()],
        );
        registry.register(
            Arc::new(FixedProvider::from_prices(
                "beta",
                BTreeMap::from([(pair.clone(), dec!(11))]),
            )),
            vec![pair],
        );

        assert_eq!(registry.len(), 2);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("gamma").is_none());
    }
}
