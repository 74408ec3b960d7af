//! Oracle module - Multi-provider price collection
//!
//! Fetches tickers and candles from every configured provider and reduces them
//! to one canonical price per base asset.

mod aggregator;
pub mod candles;
pub mod sources;

pub use aggregator::{compute_oracle_prices, compute_vwap, ProviderAggregator, PRICE_DECIMALS};
pub use candles::compute_tvwap;
pub use sources::{Provider, ProviderError, ProviderRegistry};
