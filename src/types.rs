//! Core types used throughout the oracle
//!
//! Defines currency pairs, provider price records and the nested maps the
//! extend-vote engine accumulates per height.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{OracleError, Result};

/// Asset base -> price. Ordered so that serialized payloads are canonical.
pub type PriceMap = BTreeMap<String, Decimal>;

/// Currency pair (e.g. ATOM/USD)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    /// Build a pair, upper-casing both symbols.
    pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>) -> Result<Self> {
        let base = base.as_ref().trim().to_uppercase();
        let quote = quote.as_ref().trim().to_uppercase();

        if base.is_empty() || quote.is_empty() {
            return Err(OracleError::InvalidPair(format!("{}/{}", base, quote)));
        }
        if base == quote {
            return Err(OracleError::InvalidPair(format!(
                "base and quote are both {}",
                base
            )));
        }
        if !base.chars().chain(quote.chars()).all(|c| c.is_ascii_alphanumeric()) {
            return Err(OracleError::InvalidPair(format!("{}/{}", base, quote)));
        }

        Ok(Self { base, quote })
    }
}

/// Canonical form used as provider map key and exchange symbol (e.g. "ATOMUSD")
impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.quote)
    }
}

/// Parses "BASE/QUOTE" or "BASE-QUOTE"
impl FromStr for CurrencyPair {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self> {
        let (base, quote) = s
            .split_once('/')
            .or_else(|| s.split_once('-'))
            .ok_or_else(|| OracleError::InvalidPair(s.to_string()))?;
        CurrencyPair::new(base, quote)
    }
}

/// Latest trade price and rolling volume for one pair from one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerPrice {
    pub price: Decimal,
    /// 24h volume
    pub volume: Decimal,
}

/// One historical trade bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandlePrice {
    /// Close price of the bucket
    pub price: Decimal,
    pub volume: Decimal,
    /// Unix seconds
    pub timestamp: i64,
}

/// provider -> base -> ticker (e.g. Binance -> ATOM -> 11.98)
pub type AggregatedProviderPrices = HashMap<String, HashMap<String, TickerPrice>>;

/// provider -> base -> candles (e.g. Binance -> ATOM -> [<11.98, 24000, 12:00UTC>])
pub type AggregatedProviderCandles = HashMap<String, HashMap<String, Vec<CandlePrice>>>;
