//! Error types for the oracle protocol
//!
//! Provider-level failures are absorbed by the extend-vote engine; every other
//! variant surfaces to the host as a reject decision or a missing payload.

use thiserror::Error;

use crate::oracle::sources::ProviderError;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("provider {provider} failed: {source}")]
    ProviderFailed {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("provider {provider} timed out after {timeout_ms}ms")]
    ProviderTimeout { provider: String, timeout_ms: u64 },

    #[error("provider {provider} returned no price or candle for {pair}")]
    NoProviderData { provider: String, pair: String },

    #[error("failed to compute price for {base}")]
    IncompleteData { base: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u32),

    #[error("vote extension height does not match request height; expected: {expected}, got: {got}")]
    HeightMismatch { expected: i64, got: i64 },

    #[error("unsupported asset {0}")]
    UnsupportedAsset(String),

    #[error("attestation is missing price for {0}")]
    MissingAsset(String),

    #[error("negative price {price} for {base}")]
    NegativePrice { base: String, price: String },

    #[error("price {price} for {base} deviates from local reference {reference} beyond {max_deviation}")]
    PriceOutOfRange {
        base: String,
        price: String,
        reference: String,
        max_deviation: String,
    },

    #[error("stake-weighted price mismatch for {base}: proposed {proposed:?}, computed {computed:?}")]
    AggregationInconsistency {
        base: String,
        proposed: Option<String>,
        computed: Option<String>,
    },

    #[error("total voting power is zero")]
    ZeroVotingPower,

    #[error("validator {0} appears more than once in commit info")]
    DuplicateVote(String),

    #[error("negative voting power {power} for validator {validator}")]
    NegativeVotingPower { validator: String, power: i64 },

    #[error("injected record of {size} bytes exceeds max_tx_bytes {max_tx_bytes}")]
    ProposalTooLarge { size: usize, max_tx_bytes: i64 },

    #[error("no supported currency pairs")]
    NoSupportedPairs,

    #[error("arithmetic overflow while aggregating {0}")]
    ArithmeticOverflow(String),

    #[error("invalid currency pair: {0}")]
    InvalidPair(String),

    #[error("oracle store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, OracleError>;
