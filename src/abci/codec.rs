//! Wire codec for attestations and the injected proposal record
//!
//! Both payloads are JSON with decimals encoded as strings and prices in an
//! ordered map, so every validator produces identical bytes for identical
//! values. Decoding is strict: unknown fields are rejected.

use serde::{Deserialize, Serialize};

use crate::abci::types::ExtendedCommitInfo;
use crate::error::{OracleError, Result};
use crate::types::PriceMap;

/// Current attestation schema version
pub const VOTE_EXTENSION_VERSION: u32 = 1;

fn current_version() -> u32 {
    VOTE_EXTENSION_VERSION
}

/// Canonical per-validator attestation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleVoteExtension {
    /// Absent in legacy payloads, which are read as version 1
    #[serde(default = "current_version")]
    pub version: u32,
    pub height: i64,
    pub prices: PriceMap,
}

impl OracleVoteExtension {
    pub fn new(height: i64, prices: PriceMap) -> Self {
        Self {
            version: VOTE_EXTENSION_VERSION,
            height,
            prices,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| OracleError::Encode(e.to_string()))
    }

    pub fn from_bytes(bz: &[u8]) -> Result<Self> {
        let ext: Self = serde_json::from_slice(bz)
            .map_err(|e| OracleError::Decode(format!("vote extension: {}", e)))?;
        if ext.version != VOTE_EXTENSION_VERSION {
            return Err(OracleError::UnsupportedVersion(ext.version));
        }
        Ok(ext)
    }
}

/// Record the proposer injects as the first proposal transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StakeWeightedPrices {
    pub prices: PriceMap,
    #[serde(rename = "commitInfo")]
    pub commit_info: ExtendedCommitInfo,
}

impl StakeWeightedPrices {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| OracleError::Encode(e.to_string()))
    }

    pub fn from_bytes(bz: &[u8]) -> Result<Self> {
        serde_json::from_slice(bz)
            .map_err(|e| OracleError::Decode(format!("stake-weighted prices: {}", e)))
    }
}
