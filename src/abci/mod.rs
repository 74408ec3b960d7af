//! Consensus lifecycle hooks: vote extensions and proposal handling

mod cache;
pub mod codec;
mod proposal;
pub mod types;
mod vote_ext;

pub use cache::ComputedPriceCache;
pub use codec::{OracleVoteExtension, StakeWeightedPrices, VOTE_EXTENSION_VERSION};
pub use proposal::{compute_stake_weighted_prices, ProposalHandler};
pub use types::*;
pub use vote_ext::{verify_prices, VoteExtHandler};
