//! Host request/response shapes for the four lifecycle hooks, and the
//! commit-info structure the host hands to the proposer.

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockIdFlag {
    #[serde(rename = "BLOCK_ID_FLAG_UNKNOWN")]
    Unknown,
    #[serde(rename = "BLOCK_ID_FLAG_ABSENT")]
    Absent,
    #[serde(rename = "BLOCK_ID_FLAG_COMMIT")]
    Commit,
    #[serde(rename = "BLOCK_ID_FLAG_NIL")]
    Nil,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Validator {
    #[serde(with = "hex_bytes")]
    pub address: Vec<u8>,
    pub power: i64,
}

impl Validator {
    pub fn address_hex(&self) -> String {
        hex::encode_upper(&self.address)
    }
}

/// One validator's pre-commit for the previous height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExtendedVoteInfo {
    pub validator: Validator,
    #[serde(with = "base64_bytes")]
    pub vote_extension: Vec<u8>,
    pub block_id_flag: BlockIdFlag,
}

/// Attestations and voting power of the previous height
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtendedCommitInfo {
    pub round: i32,
    pub votes: Vec<ExtendedVoteInfo>,
}

#[derive(Debug, Clone)]
pub struct RequestExtendVote {
    pub height: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseExtendVote {
    pub vote_extension: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RequestVerifyVoteExtension {
    pub height: i64,
    pub validator_address: Vec<u8>,
    pub vote_extension: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseVerifyVoteExtension {
    pub status: VerifyStatus,
}

#[derive(Debug, Clone)]
pub struct RequestPrepareProposal {
    pub height: i64,
    /// Upper bound on the summed size of the returned transactions
    pub max_tx_bytes: i64,
    /// Transactions from the mempool, in priority order
    pub txs: Vec<Vec<u8>>,
    pub local_last_commit: ExtendedCommitInfo,
}

#[derive(Debug, Clone, Default)]
pub struct ResponsePrepareProposal {
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct RequestProcessProposal {
    pub height: i64,
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseProcessProposal {
    pub status: ProposalStatus,
}

mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode_upper(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        hex::decode(raw).map_err(serde::de::Error::custom)
    }
}

mod base64_bytes {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        STANDARD.decode(raw).map_err(serde::de::Error::custom)
    }
}
