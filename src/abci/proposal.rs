//! PrepareProposal / ProcessProposal handler
//!
//! The proposer folds the previous height's attestations into one
//! stake-weighted price per base and injects the result, together with the
//! commit info it was computed from, as the first proposal transaction. Every
//! validator recomputes from that commit info and commits only on an exact
//! match.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::abci::codec::{OracleVoteExtension, StakeWeightedPrices};
use crate::abci::types::{
    BlockIdFlag, ExtendedCommitInfo, ProposalStatus, RequestPrepareProposal,
    RequestProcessProposal, ResponsePrepareProposal, ResponseProcessProposal,
};
use crate::error::{OracleError, Result};
use crate::state::{OracleStore, PairRegistry};
use crate::types::PriceMap;

/// Stake-weighted mean per required base over the committed attestations.
///
/// Only votes flagged `Commit` with a non-empty extension count, both for the
/// per-base sums and for the total power. Each counted attestation must be for
/// `vote_height`, and a validator may appear only once. Bases nobody attested
/// to are omitted. Iteration order of `commit.votes` does not affect the result.
pub fn compute_stake_weighted_prices(
    required: &BTreeSet<String>,
    commit: &ExtendedCommitInfo,
    vote_height: i64,
) -> Result<PriceMap> {
    if required.is_empty() {
        return Err(OracleError::NoSupportedPairs);
    }

    let mut weighted: BTreeMap<&str, Decimal> = BTreeMap::new();
    let mut total_power = Decimal::ZERO;
    let mut seen: BTreeSet<&[u8]> = BTreeSet::new();

    for vote in &commit.votes {
        if !seen.insert(vote.validator.address.as_slice()) {
            return Err(OracleError::DuplicateVote(vote.validator.address_hex()));
        }
        if vote.block_id_flag != BlockIdFlag::Commit || vote.vote_extension.is_empty() {
            continue;
        }
        if vote.validator.power < 0 {
            return Err(OracleError::NegativeVotingPower {
                validator: vote.validator.address_hex(),
                power: vote.validator.power,
            });
        }

        let ext = OracleVoteExtension::from_bytes(&vote.vote_extension)?;
        if ext.height != vote_height {
            return Err(OracleError::HeightMismatch {
                expected: vote_height,
                got: ext.height,
            });
        }
        let power = Decimal::from(vote.validator.power);
        total_power = total_power
            .checked_add(power)
            .ok_or_else(|| OracleError::ArithmeticOverflow("total voting power".to_string()))?;

        for base in required {
            let Some(price) = ext.prices.get(base) else {
                continue;
            };
            let overflow = || OracleError::ArithmeticOverflow(base.clone());
            let contribution = price.checked_mul(power).ok_or_else(overflow)?;
            let sum = weighted.entry(base.as_str()).or_insert(Decimal::ZERO);
            *sum = sum.checked_add(contribution).ok_or_else(overflow)?;
        }
    }

    if total_power.is_zero() {
        return Err(OracleError::ZeroVotingPower);
    }

    weighted
        .into_iter()
        .map(|(base, sum)| {
            sum.checked_div(total_power)
                .map(|price| (base.to_string(), price))
                .ok_or_else(|| OracleError::ArithmeticOverflow(base.to_string()))
        })
        .collect()
}

/// First base on which two price maps disagree, compared by exact value
fn first_mismatch(proposed: &PriceMap, computed: &PriceMap) -> Option<OracleError> {
    proposed
        .keys()
        .chain(computed.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .find(|base| proposed.get(*base) != computed.get(*base))
        .map(|base| OracleError::AggregationInconsistency {
            base: base.clone(),
            proposed: proposed.get(base).map(ToString::to_string),
            computed: computed.get(base).map(ToString::to_string),
        })
}

pub struct ProposalHandler {
    pairs: Arc<dyn PairRegistry>,
    store: Arc<dyn OracleStore>,
}

impl ProposalHandler {
    pub fn new(pairs: Arc<dyn PairRegistry>, store: Arc<dyn OracleStore>) -> Self {
        Self { pairs, store }
    }

    /// Build the proposal: injected record first, then as many host
    /// transactions as fit in `max_tx_bytes` (non-positive means unbounded).
    pub fn prepare_proposal(&self, req: RequestPrepareProposal) -> Result<ResponsePrepareProposal> {
        let required = self.pairs.required_bases();
        let prices = compute_stake_weighted_prices(&required, &req.local_last_commit, req.height - 1)?;

        let record = StakeWeightedPrices {
            prices,
            commit_info: req.local_last_commit,
        };
        let bz = record.to_bytes()?;

        let limit = usize::try_from(req.max_tx_bytes)
            .ok()
            .filter(|limit| *limit > 0)
            .unwrap_or(usize::MAX);
        if bz.len() > limit {
            return Err(OracleError::ProposalTooLarge {
                size: bz.len(),
                max_tx_bytes: req.max_tx_bytes,
            });
        }

        info!(
            height = req.height,
            assets = record.prices.len(),
            votes = record.commit_info.votes.len(),
            bytes = bz.len(),
            "Injecting stake-weighted oracle prices"
        );

        let mut used = bz.len();
        let mut txs = vec![bz];
        let offered = req.txs.len();
        for tx in req.txs {
            if used.saturating_add(tx.len()) > limit {
                continue;
            }
            used += tx.len();
            txs.push(tx);
        }
        if txs.len() - 1 < offered {
            debug!(
                height = req.height,
                dropped = offered - (txs.len() - 1),
                "Host transactions exceed max_tx_bytes"
            );
        }

        Ok(ResponsePrepareProposal { txs })
    }

    /// Host adapter for PrepareProposal: when no record can be built the
    /// proposal is empty, which every validator accepts.
    pub fn prepare_proposal_or_empty(&self, req: RequestPrepareProposal) -> ResponsePrepareProposal {
        let height = req.height;
        self.prepare_proposal(req).unwrap_or_else(|err| {
            warn!(height, error = %err, "Proposing without oracle prices");
            ResponsePrepareProposal::default()
        })
    }

    /// ProcessProposal hook; commits the agreed prices on accept
    pub fn process_proposal(&self, req: RequestProcessProposal) -> ResponseProcessProposal {
        let status = match self.verify_proposal(req.height, &req.txs) {
            Ok(None) => ProposalStatus::Accept,
            Ok(Some(prices)) => match self.store.set_oracle_prices(req.height, &prices) {
                Ok(()) => {
                    info!(height = req.height, assets = prices.len(), "Committed oracle prices");
                    ProposalStatus::Accept
                }
                Err(err) => {
                    warn!(height = req.height, error = %err, "Failed to persist oracle prices");
                    ProposalStatus::Reject
                }
            },
            Err(err) => {
                warn!(height = req.height, error = %err, "Rejecting proposal");
                ProposalStatus::Reject
            }
        };

        ResponseProcessProposal { status }
    }

    /// Recompute the injected record from attestations for `height - 1`
    /// and return the prices to commit.
    ///
    /// `None` for an empty proposal.
    pub fn verify_proposal(&self, height: i64, txs: &[Vec<u8>]) -> Result<Option<PriceMap>> {
        let Some(first) = txs.first() else {
            debug!(height, "Empty proposal, no oracle update");
            return Ok(None);
        };

        let record = StakeWeightedPrices::from_bytes(first)?;
        let required = self.pairs.required_bases();
        let computed = compute_stake_weighted_prices(&required, &record.commit_info, height - 1)?;

        match first_mismatch(&record.prices, &computed) {
            Some(err) => Err(err),
            None => Ok(Some(computed)),
        }
    }
}
