//! ExtendVote / VerifyVoteExtension handler
//!
//! ExtendVote fans out to every configured provider under a per-provider
//! deadline, reduces whatever arrived to one price per base asset and attests
//! to it. It is allowed to be non-deterministic. VerifyVoteExtension is not:
//! it only reads the payload, the supported-pairs registry and this
//! validator's cached prices.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::abci::cache::ComputedPriceCache;
use crate::abci::codec::OracleVoteExtension;
use crate::abci::types::{
    RequestExtendVote, RequestVerifyVoteExtension, ResponseExtendVote,
    ResponseVerifyVoteExtension, VerifyStatus,
};
use crate::config::OracleConfig;
use crate::error::{OracleError, Result};
use crate::oracle::sources::{ProviderError, ProviderRegistry, RegisteredProvider};
use crate::oracle::ProviderAggregator;
use crate::state::PairRegistry;
use crate::types::PriceMap;

#[derive(Debug, Clone, Copy)]
struct PriceSync {
    height: i64,
    started_at: DateTime<Utc>,
}

pub struct VoteExtHandler {
    providers: ProviderRegistry,
    pairs: Arc<dyn PairRegistry>,
    provider_timeout: Duration,
    max_price_deviation: Decimal,
    candle_window_secs: i64,
    last_sync: Mutex<Option<PriceSync>>,
    computed_prices: RwLock<ComputedPriceCache>,
}

impl VoteExtHandler {
    pub fn new(
        providers: ProviderRegistry,
        pairs: Arc<dyn PairRegistry>,
        config: &OracleConfig,
    ) -> Self {
        let covered = providers.required_bases();
        let supported = pairs.required_bases();
        for base in supported.difference(&covered) {
            warn!(base = %base, "Supported asset has no configured provider");
        }
        for base in covered.difference(&supported) {
            warn!(base = %base, "Provider asset is not supported; attestations will be rejected");
        }

        Self {
            providers,
            pairs,
            provider_timeout: config.provider_timeout(),
            max_price_deviation: config.max_price_deviation,
            candle_window_secs: config.candle_window_secs,
            last_sync: Mutex::new(None),
            computed_prices: RwLock::new(ComputedPriceCache::new(config.price_retention_heights)),
        }
    }

    /// Height and wall-clock start of the most recent ExtendVote
    pub fn last_price_sync(&self) -> Option<(i64, DateTime<Utc>)> {
        self.last_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|s| (s.height, s.started_at))
    }

    /// Prices this validator attested to at `height`, if still cached
    pub fn computed_prices(&self, height: i64) -> Option<PriceMap> {
        self.computed_prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(height)
            .cloned()
    }

    /// Fetch, aggregate and attest to prices for `req.height`.
    ///
    /// Fails closed: any required base without a computed price yields an
    /// error and no payload.
    pub async fn extend_vote(&self, req: RequestExtendVote) -> Result<ResponseExtendVote> {
        let started_at = Utc::now();
        *self.last_sync.lock().unwrap_or_else(PoisonError::into_inner) = Some(PriceSync {
            height: req.height,
            started_at,
        });

        info!(
            height = req.height,
            time = %started_at,
            providers = self.providers.len(),
            "Computing oracle prices for vote extension"
        );

        let required = self.providers.required_bases();
        if required.is_empty() {
            return Err(OracleError::NoSupportedPairs);
        }

        let aggregator = Arc::new(ProviderAggregator::new());
        let fetches = self
            .providers
            .iter()
            .map(|(name, entry)| self.fetch_provider(name, entry, Arc::clone(&aggregator)));

        let failed = join_all(fetches)
            .await
            .into_iter()
            .filter_map(|res| res.err())
            .inspect(|err| warn!(height = req.height, error = %err, "Provider contributed no prices"))
            .count();

        let computed = aggregator.compute_prices(Utc::now().timestamp(), self.candle_window_secs);
        check_complete(&required, &computed).map_err(|err| {
            error!(
                height = req.height,
                failed_providers = failed,
                error = %err,
                "Not producing vote extension"
            );
            err
        })?;

        let bz = OracleVoteExtension::new(req.height, computed.clone()).to_bytes()?;

        self.computed_prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(req.height, computed);

        info!(
            height = req.height,
            assets = required.len(),
            failed_providers = failed,
            bytes = bz.len(),
            elapsed_ms = (Utc::now() - started_at).num_milliseconds(),
            "Vote extension ready"
        );

        Ok(ResponseExtendVote { vote_extension: bz })
    }

    /// Host adapter for ExtendVote: a failed height yields an empty extension.
    pub async fn extend_vote_or_empty(&self, req: RequestExtendVote) -> ResponseExtendVote {
        self.extend_vote(req).await.unwrap_or_default()
    }

    /// One provider's fetch, raced against the per-provider deadline.
    ///
    /// The fetch runs as its own task; on timeout it is detached and whatever
    /// it returns later is dropped.
    async fn fetch_provider(
        &self,
        name: &str,
        entry: &RegisteredProvider,
        aggregator: Arc<ProviderAggregator>,
    ) -> Result<()> {
        let provider = Arc::clone(&entry.provider);
        let pairs = entry.pairs.clone();

        let fetch = tokio::spawn(async move {
            tokio::try_join!(provider.ticker_prices(&pairs), provider.candle_prices(&pairs))
        });

        let (prices, candles) = match tokio::time::timeout(self.provider_timeout, fetch).await {
            Err(_) => {
                return Err(OracleError::ProviderTimeout {
                    provider: name.to_string(),
                    timeout_ms: self.provider_timeout.as_millis() as u64,
                })
            }
            Ok(Err(join_err)) => {
                return Err(OracleError::ProviderFailed {
                    provider: name.to_string(),
                    source: ProviderError::Task(join_err.to_string()),
                })
            }
            Ok(Ok(Err(source))) => {
                return Err(OracleError::ProviderFailed {
                    provider: name.to_string(),
                    source,
                })
            }
            Ok(Ok(Ok(fetched))) => fetched,
        };

        debug!(
            provider = %name,
            tickers = prices.len(),
            candles = candles.len(),
            "Provider responded"
        );

        let mut missing = entry
            .pairs
            .iter()
            .filter(|pair| !aggregator.record_provider_result(name, &prices, &candles, pair))
            .map(|pair| OracleError::NoProviderData {
                provider: name.to_string(),
                pair: pair.to_string(),
            })
            .collect::<Vec<_>>();

        match missing.len() {
            0 => Ok(()),
            n if n == entry.pairs.len() => Err(missing.remove(0)),
            _ => {
                for err in &missing {
                    warn!(error = %err, "Partial provider response");
                }
                Ok(())
            }
        }
    }

    /// VerifyVoteExtension hook
    pub fn verify_vote_extension(&self, req: RequestVerifyVoteExtension) -> ResponseVerifyVoteExtension {
        match self.verify(req.height, &req.vote_extension) {
            Ok(()) => ResponseVerifyVoteExtension {
                status: VerifyStatus::Accept,
            },
            Err(err) => {
                warn!(
                    height = req.height,
                    validator = %hex::encode_upper(&req.validator_address),
                    error = %err,
                    "Rejecting vote extension"
                );
                ResponseVerifyVoteExtension {
                    status: VerifyStatus::Reject,
                }
            }
        }
    }

    /// Validate one attestation against the request height, the supported
    /// pairs and this validator's own prices for `height` (or `height - 1`).
    ///
    /// An empty payload is an abstention and is accepted.
    pub fn verify(&self, height: i64, vote_extension: &[u8]) -> Result<()> {
        if vote_extension.is_empty() {
            return Ok(());
        }

        let ext = OracleVoteExtension::from_bytes(vote_extension)?;
        if ext.height != height {
            return Err(OracleError::HeightMismatch {
                expected: height,
                got: ext.height,
            });
        }

        let required = self.pairs.required_bases();
        let cache = self
            .computed_prices
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        verify_prices(
            &ext.prices,
            &required,
            cache.reference_for(height),
            self.max_price_deviation,
        )
    }
}

fn check_complete(required: &BTreeSet<String>, computed: &PriceMap) -> Result<()> {
    match required.iter().find(|base| !computed.contains_key(*base)) {
        Some(base) => Err(OracleError::IncompleteData { base: base.clone() }),
        None => Ok(()),
    }
}

/// Deterministic sanity check of attested prices.
///
/// Every attested base must be supported and non-negative, every supported
/// base must be attested, and where a local reference `r` exists the price
/// `p` must satisfy `|p - r| / r <= max_deviation` (`p == 0` when `r == 0`).
pub fn verify_prices(
    prices: &PriceMap,
    required: &BTreeSet<String>,
    reference: Option<&PriceMap>,
    max_deviation: Decimal,
) -> Result<()> {
    for (base, price) in prices {
        if !required.contains(base) {
            return Err(OracleError::UnsupportedAsset(base.clone()));
        }
        if price.is_sign_negative() && !price.is_zero() {
            return Err(OracleError::NegativePrice {
                base: base.clone(),
                price: price.to_string(),
            });
        }

        let Some(local) = reference.and_then(|r| r.get(base)) else {
            continue;
        };
        if !within_deviation(*price, *local, max_deviation) {
            return Err(OracleError::PriceOutOfRange {
                base: base.clone(),
                price: price.to_string(),
                reference: local.to_string(),
                max_deviation: max_deviation.to_string(),
            });
        }
    }

    if let Some(missing) = required.iter().find(|base| !prices.contains_key(*base)) {
        return Err(OracleError::MissingAsset(missing.clone()));
    }

    Ok(())
}

fn within_deviation(price: Decimal, reference: Decimal, max_deviation: Decimal) -> bool {
    if reference.is_zero() {
        return price.is_zero();
    }
    price
        .checked_sub(reference)
        .and_then(|diff| diff.abs().checked_div(reference.abs()))
        .map_or(false, |deviation| deviation <= max_deviation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::sources::{FixedProvider, MockProvider};
    use crate::state::StaticPairRegistry;
    use crate::types::{CandlePrice, CurrencyPair, TickerPrice};
    use rust_decimal_macros::dec;
    use std::collections::{BTreeMap, HashMap};

    fn atom() -> CurrencyPair {
        CurrencyPair::new("ATOM", "USD").unwrap()
    }

    fn osmo() -> CurrencyPair {
        CurrencyPair::new("OSMO", "USD").unwrap()
    }

    fn config(timeout_ms: u64) -> OracleConfig {
        OracleConfig {
            provider_timeout_ms: timeout_ms,
            ..OracleConfig::default()
        }
    }

    fn fixed(name: &str, prices: &[(CurrencyPair, Decimal)]) -> Arc<FixedProvider> {
        Arc::new(FixedProvider::from_prices(
            name,
            prices.iter().cloned().collect::<BTreeMap<_, _>>(),
        ))
    }

    fn handler(providers: ProviderRegistry, timeout_ms: u64) -> VoteExtHandler {
        handler_for(vec![atom(), osmo()], providers, timeout_ms)
    }

    fn handler_for(
        supported: Vec<CurrencyPair>,
        providers: ProviderRegistry,
        timeout_ms: u64,
    ) -> VoteExtHandler {
        let pairs = Arc::new(StaticPairRegistry::new(supported));
        VoteExtHandler::new(providers, pairs, &config(timeout_ms))
    }

    struct SlowProvider;

    #[async_trait::async_trait]
    impl crate::oracle::Provider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn ticker_prices(
            &self,
            pairs: &[CurrencyPair],
        ) -> std::result::Result<HashMap<String, TickerPrice>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(pairs
                .iter()
                .map(|p| {
                    (
                        p.to_string(),
                        TickerPrice {
                            price: dec!(1),
                            volume: dec!(1),
                        },
                    )
                })
                .collect())
        }

        async fn candle_prices(
            &self,
            _pairs: &[CurrencyPair],
        ) -> std::result::Result<HashMap<String, Vec<CandlePrice>>, ProviderError> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_extend_vote_attests_every_required_base() {
        let mut providers = ProviderRegistry::new();
        providers.register(fixed("a", &[(atom(), dec!(10)), (osmo(), dec!(1))]), vec![atom(), osmo()]);
        providers.register(fixed("b", &[(atom(), dec!(12))]), vec![atom()]);
        let handler = handler(providers, 1000);

        let res = handler
            .extend_vote(RequestExtendVote { height: 7 })
            .await
            .unwrap();
        let ext = OracleVoteExtension::from_bytes(&res.vote_extension).unwrap();

        assert_eq!(ext.height, 7);
        assert_eq!(ext.prices.len(), 2);
        assert_eq!(ext.prices["ATOM"], dec!(11));
        assert_eq!(ext.prices["OSMO"], dec!(1));
        assert_eq!(handler.computed_prices(7), Some(ext.prices));
        assert_eq!(handler.last_price_sync().map(|(h, _)| h), Some(7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_extend_vote_tolerates_failed_provider() {
        let mut failing = MockProvider::new();
        failing
            .expect_ticker_prices()
            .returning(|_| Err(ProviderError::Status(503)));
        failing
            .expect_candle_prices()
            .returning(|_| Ok(HashMap::new()));

        let mut providers = ProviderRegistry::new();
        providers.register_as("down", Arc::new(failing), vec![atom()]);
        providers.register(fixed("up", &[(atom(), dec!(10))]), vec![atom()]);
        let handler = handler_for(vec![atom()], providers, 1000);

        let res = handler
            .extend_vote(RequestExtendVote { height: 3 })
            .await
            .unwrap();
        let ext = OracleVoteExtension::from_bytes(&res.vote_extension).unwrap();
        assert_eq!(ext.prices["ATOM"], dec!(10));
    }

    #[tokio::test]
    async fn test_extend_vote_tolerates_timed_out_provider() {
        let mut providers = ProviderRegistry::new();
        providers.register_as("slow", Arc::new(SlowProvider), vec![atom()]);
        providers.register(fixed("up", &[(atom(), dec!(10))]), vec![atom()]);
        let handler = handler_for(vec![atom()], providers, 50);

        let started = std::time::Instant::now();
        let res = handler
            .extend_vote(RequestExtendVote { height: 6 })
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        let ext = OracleVoteExtension::from_bytes(&res.vote_extension).unwrap();
        // the slow provider would have reported 1
        assert_eq!(ext.prices["ATOM"], dec!(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_extend_vote_uses_candles_from_mock() {
        let mut mock = MockProvider::new();
        mock.expect_ticker_prices().returning(|pairs| {
            Ok(pairs
                .iter()
                .map(|p| {
                    (
                        p.to_string(),
                        TickerPrice {
                            price: dec!(99),
                            volume: dec!(1),
                        },
                    )
                })
                .collect())
        });
        mock.expect_candle_prices().returning(|pairs| {
            let now = Utc::now().timestamp();
            Ok(pairs
                .iter()
                .map(|p| {
                    (
                        p.to_string(),
                        vec![CandlePrice {
                            price: dec!(10.5),
                            volume: dec!(100),
                            timestamp: now,
                        }],
                    )
                })
                .collect())
        });

        let mut providers = ProviderRegistry::new();
        providers.register_as("candles", Arc::new(mock), vec![atom()]);
        let handler = handler_for(vec![atom()], providers, 1000);

        let res = handler
            .extend_vote(RequestExtendVote { height: 1 })
            .await
            .unwrap();
        let ext = OracleVoteExtension::from_bytes(&res.vote_extension).unwrap();
        assert_eq!(ext.prices["ATOM"], dec!(10.5));
    }

    #[tokio::test]
    async fn test_extend_vote_fails_closed_when_all_providers_time_out() {
        let mut providers = ProviderRegistry::new();
        providers.register_as("slow-1", Arc::new(SlowProvider), vec![atom()]);
        providers.register_as("slow-2", Arc::new(SlowProvider), vec![atom()]);
        let handler = handler_for(vec![atom()], providers, 20);

        let started = std::time::Instant::now();

        let err = handler
            .extend_vote(RequestExtendVote { height: 4 })
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::IncompleteData { ref base } if base == "ATOM"));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(handler.computed_prices(4).is_none());

        let empty = handler
            .extend_vote_or_empty(RequestExtendVote { height: 5 })
            .await;
        assert!(empty.vote_extension.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_extend_vote_fails_when_a_base_is_uncovered() {
        let mut providers = ProviderRegistry::new();
        // only provider for OSMO has no OSMO price
        providers.register(fixed("a", &[(atom(), dec!(10))]), vec![atom(), osmo()]);
        let handler = handler(providers, 1000);

        let err = handler
            .extend_vote(RequestExtendVote { height: 2 })
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::IncompleteData { ref base } if base == "OSMO"));
    }

    #[tokio::test]
    async fn test_extend_vote_without_providers_fails_closed() {
        let handler = handler(ProviderRegistry::new(), 1000);
        assert!(matches!(
            handler.extend_vote(RequestExtendVote { height: 1 }).await,
            Err(OracleError::NoSupportedPairs)
        ));
    }

    fn verifier_with_reference(height: i64, prices: PriceMap) -> VoteExtHandler {
        let handler = handler(ProviderRegistry::new(), 1000);
        handler
            .computed_prices
            .write()
            .unwrap()
            .insert(height, prices);
        handler
    }

    fn attestation(height: i64, atom_price: Decimal, osmo_price: Decimal) -> Vec<u8> {
        OracleVoteExtension::new(
            height,
            PriceMap::from([
                ("ATOM".to_string(), atom_price),
                ("OSMO".to_string(), osmo_price),
            ]),
        )
        .to_bytes()
        .unwrap()
    }

    #[test]
    fn test_verify_rejects_height_mismatch() {
        let handler = handler(ProviderRegistry::new(), 1000);
        let bz = attestation(101, dec!(10), dec!(1));

        assert!(matches!(
            handler.verify(100, &bz),
            Err(OracleError::HeightMismatch {
                expected: 100,
                got: 101
            })
        ));

        let res = handler.verify_vote_extension(RequestVerifyVoteExtension {
            height: 100,
            validator_address: vec![0xAA; 20],
            vote_extension: bz,
        });
        assert_eq!(res.status, VerifyStatus::Reject);
    }

    #[test]
    fn test_verify_checks_deviation_against_own_prices() {
        let reference = PriceMap::from([
            ("ATOM".to_string(), dec!(10)),
            ("OSMO".to_string(), dec!(1)),
        ]);
        let handler = verifier_with_reference(50, reference);

        assert!(handler.verify(50, &attestation(50, dec!(10.9), dec!(0.95))).is_ok());
        // falls back to the previous height's prices
        assert!(handler.verify(51, &attestation(51, dec!(11), dec!(1))).is_ok());
        assert!(matches!(
            handler.verify(50, &attestation(50, dec!(11.5), dec!(1))),
            Err(OracleError::PriceOutOfRange { ref base, .. }) if base == "ATOM"
        ));
    }

    #[test]
    fn test_verify_is_repeatable() {
        let handler = verifier_with_reference(
            8,
            PriceMap::from([("ATOM".to_string(), dec!(10)), ("OSMO".to_string(), dec!(1))]),
        );
        let good = attestation(8, dec!(10.1), dec!(1));
        let bad = attestation(8, dec!(20), dec!(1));

        for _ in 0..3 {
            assert!(handler.verify(8, &good).is_ok());
            assert!(handler.verify(8, &bad).is_err());
        }
        assert_eq!(handler.computed_prices(8).unwrap().len(), 2);
    }

    #[test]
    fn test_verify_structural_rules() {
        let handler = handler(ProviderRegistry::new(), 1000);

        assert!(handler.verify(1, &[]).is_ok());
        assert!(matches!(
            handler.verify(1, b"{oops"),
            Err(OracleError::Decode(_))
        ));

        let unsupported = OracleVoteExtension::new(
            1,
            PriceMap::from([
                ("ATOM".to_string(), dec!(10)),
                ("OSMO".to_string(), dec!(1)),
                ("DOGE".to_string(), dec!(0.1)),
            ]),
        );
        assert!(matches!(
            handler.verify(1, &unsupported.to_bytes().unwrap()),
            Err(OracleError::UnsupportedAsset(ref b)) if b == "DOGE"
        ));

        let partial =
            OracleVoteExtension::new(1, PriceMap::from([("ATOM".to_string(), dec!(10))]));
        assert!(matches!(
            handler.verify(1, &partial.to_bytes().unwrap()),
            Err(OracleError::MissingAsset(ref b)) if b == "OSMO"
        ));

        assert!(matches!(
            handler.verify(1, &attestation(1, dec!(-1), dec!(1))),
            Err(OracleError::NegativePrice { .. })
        ));
    }

    #[test]
    fn test_deviation_with_zero_reference() {
        assert!(within_deviation(dec!(0), dec!(0), dec!(0.1)));
        assert!(!within_deviation(dec!(0.01), dec!(0), dec!(0.1)));
        assert!(within_deviation(dec!(9), dec!(10), dec!(0.1)));
        assert!(!within_deviation(dec!(8.99), dec!(10), dec!(0.1)));
    }
}
