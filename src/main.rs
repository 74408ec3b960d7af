//! Local consensus simulator
//!
//! Runs N in-process validators through the vote-extension lifecycle:
//! ExtendVote and VerifyVoteExtension at height H, then PrepareProposal on a
//! rotating proposer and ProcessProposal on every validator at H + 1.

use anyhow::{Context, Result};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use vote_ext_oracle::abci::{
    BlockIdFlag, ExtendedCommitInfo, ExtendedVoteInfo, ProposalHandler, ProposalStatus,
    RequestExtendVote, RequestPrepareProposal, RequestProcessProposal, RequestVerifyVoteExtension,
    Validator, VerifyStatus, VoteExtHandler,
};
use vote_ext_oracle::config::AppConfig;
use vote_ext_oracle::logging;
use vote_ext_oracle::oracle::ProviderRegistry;
use vote_ext_oracle::state::{InMemoryOracleStore, OracleStore, PairRegistry, StaticPairRegistry};

const MAX_TX_BYTES: i64 = 1024 * 1024;

struct Node {
    validator: Validator,
    vote_ext: VoteExtHandler,
    proposal: ProposalHandler,
    store: Arc<InMemoryOracleStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init(&config.logging);

    info!(config = %config, "Starting vote extension oracle simulator");

    let providers = ProviderRegistry::from_config(&config.providers)
        .context("Failed to build price providers")?;
    if providers.is_empty() {
        warn!("No price providers configured; every vote extension will be empty");
    }

    let pairs: Arc<dyn PairRegistry> = Arc::new(StaticPairRegistry::new(config.supported_pairs()?));
    let nodes = (0..config.node.validators)
        .map(|i| {
            let store = Arc::new(InMemoryOracleStore::new());
            Node {
                validator: Validator {
                    address: validator_address(i),
                    power: config.node.voting_power,
                },
                vote_ext: VoteExtHandler::new(providers.clone(), Arc::clone(&pairs), &config.oracle),
                proposal: ProposalHandler::new(Arc::clone(&pairs), store.clone()),
                store,
            }
        })
        .collect::<Vec<_>>();

    tokio::select! {
        res = run(&nodes, &config) => res?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
    }

    Ok(())
}

/// 20-byte address with the 1-based index in the low four bytes
fn validator_address(index: usize) -> Vec<u8> {
    let mut address = vec![0u8; 20];
    address[16..].copy_from_slice(&(index as u32 + 1).to_be_bytes());
    address
}

async fn run(nodes: &[Node], config: &AppConfig) -> Result<()> {
    let interval = Duration::from_millis(config.node.block_interval_ms);
    let mut height = config.node.initial_height;
    let mut completed = 0u64;

    while config.node.heights == 0 || completed < config.node.heights {
        let commit = extend_and_verify(nodes, height, proposer_index(nodes, config, height + 1)).await;
        propose_and_process(nodes, config, height + 1, commit);

        completed += 1;
        height += 1;
        tokio::time::sleep(interval).await;
    }

    info!(heights = completed, "Simulation finished");
    Ok(())
}

fn proposer_index(nodes: &[Node], config: &AppConfig, height: i64) -> usize {
    (height - config.node.initial_height).rem_euclid(nodes.len() as i64) as usize
}

/// Every node attests at `height`; the next proposer keeps only the
/// extensions it accepted, the way the host builds its local commit.
async fn extend_and_verify(nodes: &[Node], height: i64, proposer: usize) -> ExtendedCommitInfo {
    let extensions = join_all(
        nodes
            .iter()
            .map(|node| node.vote_ext.extend_vote_or_empty(RequestExtendVote { height })),
    )
    .await;

    let mut votes = Vec::with_capacity(nodes.len());
    for (node, res) in nodes.iter().zip(extensions) {
        let mut accepted_by_proposer = true;
        for (j, verifier) in nodes.iter().enumerate() {
            let verdict = verifier.vote_ext.verify_vote_extension(RequestVerifyVoteExtension {
                height,
                validator_address: node.validator.address.clone(),
                vote_extension: res.vote_extension.clone(),
            });
            if j == proposer && verdict.status == VerifyStatus::Reject {
                accepted_by_proposer = false;
            }
        }

        votes.push(ExtendedVoteInfo {
            validator: node.validator.clone(),
            vote_extension: if accepted_by_proposer {
                res.vote_extension
            } else {
                Vec::new()
            },
            block_id_flag: BlockIdFlag::Commit,
        });
    }

    let attested = votes.iter().filter(|v| !v.vote_extension.is_empty()).count();
    info!(height, attested, validators = nodes.len(), "Vote extensions collected");

    ExtendedCommitInfo { round: 0, votes }
}

fn propose_and_process(
    nodes: &[Node],
    config: &AppConfig,
    height: i64,
    commit: ExtendedCommitInfo,
) {
    let proposer = &nodes[proposer_index(nodes, config, height)];
    let proposal = proposer.proposal.prepare_proposal_or_empty(RequestPrepareProposal {
        height,
        max_tx_bytes: MAX_TX_BYTES,
        txs: Vec::new(),
        local_last_commit: commit,
    });

    let accepted = nodes
        .iter()
        .filter(|node| {
            node.proposal
                .process_proposal(RequestProcessProposal {
                    height,
                    txs: proposal.txs.clone(),
                })
                .status
                == ProposalStatus::Accept
        })
        .count();

    info!(
        height,
        proposer = %proposer.validator.address_hex(),
        accepted,
        validators = nodes.len(),
        "Proposal processed"
    );

    for (base, price) in proposer.store.prices() {
        info!(height, base = %base, price = %price, "Oracle price");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_validator_addresses_are_distinct() {
        let addresses: HashSet<Vec<u8>> = (0..1000).map(validator_address).collect();
        assert_eq!(addresses.len(), 1000);
        assert_eq!(validator_address(255)[16..], [0, 0, 1, 0]);
    }
}
