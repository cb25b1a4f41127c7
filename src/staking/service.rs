//! Staking Service
//!
//! Cached, failure-tolerant reads for every staking pool. Read errors never
//! escape as `Err`: they come back as `QueryState::Failed` carrying the last
//! known value (or the zero default) next to the error text, so a caller can
//! tell "still loading" from "zeroed because the read failed".
//!
//! Cache windows:
//! - account data: `ACCOUNT_CACHE_SECS` (volatile)
//! - pool totals and reward rates: `POOL_CACHE_SECS`

use alloy_primitives::Address;
use eyre::{eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::apy::{get_staking_apy, StakingApyEntry};
use super::boost::calculate_boost_map;
use super::registry::{parse_address, StakingConfig, StakingNamespace, StakingRegistry};
use super::types::{AccountState, PoolStats, StakingMutation};
use super::withdrawal::{PendingWithdrawalSync, SyncOutcome, UserEntityRef};
use crate::cache::{CacheKey, TtlCache};
use crate::chain::ChainReader;
use crate::subgraph::{StakingPosition, SubgraphClient};
use crate::tvl::{LpTvlEstimator, Tvl};
use crate::units::TokenAmount;

// ============================================
// QUERY STATE
// ============================================

#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// No result yet
    Loading,
    Ready(T),
    /// The read failed; `fallback` is the last good value or the default
    Failed { fallback: T, error: String },
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, QueryState::Failed { .. })
    }

    /// Value to display, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            QueryState::Loading => None,
            QueryState::Ready(value) => Some(value),
            QueryState::Failed { fallback, .. } => Some(fallback),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

// ============================================
// SERVICE
// ============================================

pub struct StakingService {
    registry: Arc<StakingRegistry>,
    chain: Arc<dyn ChainReader>,
    subgraph: Arc<dyn SubgraphClient>,
    tvl: LpTvlEstimator,

    /// Shared with every cache; a switch discards in-flight fetches
    chain_id: Arc<AtomicU64>,

    accounts: TtlCache<CacheKey, AccountState>,
    pools: TtlCache<CacheKey, PoolStats>,
    rewards: TtlCache<CacheKey, Vec<StakingApyEntry>>,
}

impl StakingService {
    pub fn new(
        registry: Arc<StakingRegistry>,
        chain: Arc<dyn ChainReader>,
        subgraph: Arc<dyn SubgraphClient>,
        chain_id: u64,
        account_ttl: Duration,
        pool_ttl: Duration,
    ) -> Self {
        let chain_id = Arc::new(AtomicU64::new(chain_id));
        Self {
            registry,
            chain,
            subgraph,
            tvl: LpTvlEstimator::new(),
            accounts: TtlCache::new(account_ttl, chain_id.clone()),
            pools: TtlCache::new(pool_ttl, chain_id.clone()),
            rewards: TtlCache::new(pool_ttl, chain_id.clone()),
            chain_id,
        }
    }

    pub fn registry(&self) -> &StakingRegistry {
        &self.registry
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id.load(Ordering::SeqCst)
    }

    fn config(&self, namespace: StakingNamespace) -> Result<&StakingConfig> {
        Ok(self.registry.get_config(namespace)?)
    }

    // ============================================
    // ACCOUNT
    // ============================================

    /// Balances and pending withdrawal of `address` in `namespace`
    pub async fn account_state(
        &self,
        namespace: StakingNamespace,
        address: &str,
    ) -> Result<QueryState<AccountState>> {
        let key = CacheKey::account(namespace, address);
        if let Some(state) = self.accounts.get_fresh(&key).await {
            return Ok(QueryState::Ready(state));
        }
        self.refresh_account(namespace, address).await
    }

    /// Refetch regardless of cache age
    pub async fn refresh_account(
        &self,
        namespace: StakingNamespace,
        address: &str,
    ) -> Result<QueryState<AccountState>> {
        let config = self.config(namespace)?;
        let account = parse_account(address)?;
        let key = CacheKey::account(namespace, address);

        let ticket = self.accounts.begin_fetch(&key).await;
        let previous = self.accounts.get_any(&key).await;

        let (staked, receipt) = futures::join!(
            self.chain.staked_balance(config.staking_manager, account),
            self.chain.balance_of(config.staking_token, account),
        );

        let (staked_balance, staking_token_balance) = match (staked, receipt) {
            (Ok(staked), Ok(receipt)) => (staked, receipt),
            (Err(e), _) | (_, Err(e)) => {
                warn!("{}: account read failed for {}: {}", namespace, address, e);
                return Ok(QueryState::Failed {
                    fallback: previous.unwrap_or_default(),
                    error: e.to_string(),
                });
            }
        };

        let state = AccountState {
            staked_balance,
            staking_token_balance,
            pending_withdrawal: previous.and_then(|p| p.pending_withdrawal),
        };

        if !self.accounts.complete_fetch(key.clone(), ticket, state.clone()).await {
            // Superseded; the newer fetch owns the cache entry
            return Ok(QueryState::Ready(state));
        }

        if let Err(e) = self
            .sync_pending_withdrawal(namespace, Some(address), UserEntityRef::Configured)
            .await
        {
            warn!("{}: pending withdrawal sync failed for {}: {}", namespace, address, e);
        }

        let state = self.accounts.get_any(&key).await.unwrap_or(state);
        Ok(QueryState::Ready(state))
    }

    /// Merge the subgraph's pending withdrawal into the cached account
    pub async fn sync_pending_withdrawal(
        &self,
        namespace: StakingNamespace,
        address: Option<&str>,
        entity: UserEntityRef<'_>,
    ) -> Result<SyncOutcome> {
        let config = self.config(namespace)?;
        PendingWithdrawalSync::new(self.subgraph.as_ref(), &self.accounts)
            .sync(config, address, entity)
            .await
    }

    /// Stake and withdrawal history of `address`, newest first. Not cached.
    pub async fn position_history(
        &self,
        namespace: StakingNamespace,
        address: &str,
    ) -> Result<QueryState<Vec<StakingPosition>>> {
        let config = self.config(namespace)?;
        parse_account(address)?;
        let id = config.subgraph.id_for_user(address);

        match self
            .subgraph
            .staking_positions(&config.subgraph.user_entity, &id)
            .await
        {
            Ok(positions) => Ok(QueryState::Ready(positions)),
            Err(e) => {
                warn!("{}: position history read failed for {}: {}", namespace, address, e);
                Ok(QueryState::Failed {
                    fallback: Vec::new(),
                    error: e.to_string(),
                })
            }
        }
    }

    // ============================================
    // POOL
    // ============================================

    /// Active reward slots and their per-second rates
    pub async fn staking_apy(
        &self,
        namespace: StakingNamespace,
    ) -> Result<QueryState<Vec<StakingApyEntry>>> {
        let config = self.config(namespace)?;
        let key = CacheKey::pool(namespace);

        if let Some(entries) = self.rewards.get_fresh(&key).await {
            return Ok(QueryState::Ready(entries));
        }

        let ticket = self.rewards.begin_fetch(&key).await;
        match get_staking_apy(self.chain.as_ref(), config).await {
            Ok(entries) => {
                self.rewards.complete_fetch(key, ticket, entries.clone()).await;
                Ok(QueryState::Ready(entries))
            }
            Err(e) => {
                warn!("{}: reward slot read failed: {}", namespace, e);
                Ok(QueryState::Failed {
                    fallback: self.rewards.get_any(&key).await.unwrap_or_default(),
                    error: e.to_string(),
                })
            }
        }
    }

    /// Total staked, reward rates and the on-chain withdrawal cooldown
    pub async fn pool_stats(&self, namespace: StakingNamespace) -> Result<QueryState<PoolStats>> {
        let config = self.config(namespace)?;
        let key = CacheKey::pool(namespace);

        if let Some(stats) = self.pools.get_fresh(&key).await {
            return Ok(QueryState::Ready(stats));
        }

        let ticket = self.pools.begin_fetch(&key).await;
        let (total, rewards, params) = futures::join!(
            self.chain.total_staked(config.staking_manager),
            self.staking_apy(namespace),
            self.chain.staking_params(config.staking_manager),
        );

        let total_staked = match total {
            Ok(total) => total,
            Err(e) => {
                warn!("{}: total staked read failed: {}", namespace, e);
                return Ok(QueryState::Failed {
                    fallback: self.pools.get_any(&key).await.unwrap_or_default(),
                    error: e.to_string(),
                });
            }
        };

        let rewards = rewards?;
        let reward_rates = rewards
            .value()
            .map(|entries| entries.iter().map(|e| (e.index, e.rate)).collect())
            .unwrap_or_default();
        let cooldown_secs = match params {
            Ok(params) => params.cooldown_secs,
            Err(e) => {
                warn!(
                    "{}: _params read failed, assuming {}s cooldown: {}",
                    namespace, config.cooldown_secs, e
                );
                config.cooldown_secs
            }
        };
        let stats = PoolStats {
            total_staked,
            reward_rates,
            cooldown_secs,
        };

        if let Some(error) = rewards.error() {
            // Rates are partial; don't cache them as fresh
            return Ok(QueryState::Failed {
                fallback: stats,
                error: error.to_string(),
            });
        }

        self.pools.complete_fetch(key, ticket, stats.clone()).await;
        Ok(QueryState::Ready(stats))
    }

    /// Withdrawal cooldown of the pool: the manager's `_params` when pool
    /// stats are available, the configured duration otherwise
    pub async fn cooldown_secs(&self, namespace: StakingNamespace) -> Result<u64> {
        let config = self.config(namespace)?;
        let stats = self.pool_stats(namespace).await?;
        Ok(match stats {
            QueryState::Ready(stats) => stats.cooldown_secs,
            _ => config.cooldown_secs,
        })
    }

    pub fn tvl(&self, namespace: StakingNamespace) -> Result<Option<Tvl>> {
        Ok(self.tvl.get_tvl(self.config(namespace)?))
    }

    // ============================================
    // BOOST
    // ============================================

    /// Boost per depositor, from KITE stakes reported by the subgraph.
    /// `deposits` maps depositor address to a human-decimal deposit.
    pub async fn boost_map(
        &self,
        deposits: &HashMap<String, String>,
        total_deposited: TokenAmount,
    ) -> Result<QueryState<HashMap<String, f64>>> {
        let kite = self.config(StakingNamespace::Kite)?;

        let (balances, pool) = futures::join!(
            self.subgraph.staked_balances(&kite.subgraph.user_entity),
            self.pool_stats(StakingNamespace::Kite),
        );
        let pool = pool?;

        let failure = match (&balances, pool.error()) {
            (Err(e), _) => Some(e.to_string()),
            (_, Some(error)) => Some(error.to_string()),
            _ => None,
        };

        if let Some(error) = failure {
            warn!("boost inputs unavailable: {}", error);
            let fallback = calculate_boost_map(deposits, &HashMap::new(), TokenAmount::ZERO, total_deposited);
            return Ok(QueryState::Failed { fallback, error });
        }

        let staking = balances.unwrap_or_default();
        let total_staked = pool
            .value()
            .map(|stats| stats.total_staked.to_token_amount(kite.decimals))
            .unwrap_or(TokenAmount::ZERO);

        Ok(QueryState::Ready(calculate_boost_map(
            deposits,
            &staking,
            total_staked,
            total_deposited,
        )))
    }

    // ============================================
    // MUTATIONS + CHAIN SWITCH
    // ============================================

    /// Drop the entries a confirmed user action made stale
    pub async fn invalidate_after(
        &self,
        mutation: StakingMutation,
        namespace: StakingNamespace,
        address: &str,
    ) {
        debug!("{}: invalidating after {:?}", namespace, mutation);
        self.accounts.invalidate(&CacheKey::account(namespace, address)).await;

        match mutation {
            StakingMutation::Stake
            | StakingMutation::InitiateWithdrawal
            | StakingMutation::CancelWithdrawal
            | StakingMutation::Withdraw => {
                self.pools.invalidate(&CacheKey::pool(namespace)).await;
            }
            StakingMutation::ClaimRewards => {}
        }
    }

    /// Switch chains; everything cached or in flight for the old one is dropped
    pub async fn set_chain_id(&self, chain_id: u64) {
        let previous = self.chain_id.swap(chain_id, Ordering::SeqCst);
        if previous == chain_id {
            return;
        }
        info!("Chain switched {} -> {}, clearing caches", previous, chain_id);
        self.clear_caches().await;
    }

    pub async fn clear_caches(&self) {
        self.accounts.clear().await;
        self.pools.clear().await;
        self.rewards.clear().await;
    }

    // ============================================
    // POLLING
    // ============================================

    /// Refetch `address` every `interval` and publish each result. Failures
    /// are published as `Failed` and the loop keeps going; it only stops
    /// once every receiver is gone.
    pub fn spawn_account_poller(
        self: &Arc<Self>,
        namespace: StakingNamespace,
        address: String,
        interval: Duration,
    ) -> Result<(watch::Receiver<QueryState<AccountState>>, JoinHandle<()>)> {
        if interval.is_zero() {
            return Err(eyre!("poll interval must be non-zero"));
        }

        let (tx, rx) = watch::channel(QueryState::Loading);
        let service = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    debug!("{}: no subscribers left, stopping poller for {}", namespace, address);
                    break;
                }

                let state = match service.refresh_account(namespace, &address).await {
                    Ok(state) => state,
                    Err(e) => {
                        let last = tx.borrow().value().cloned().unwrap_or_default();
                        QueryState::Failed {
                            fallback: last,
                            error: e.to_string(),
                        }
                    }
                };
                tx.send_replace(state);
            }
        });

        Ok((rx, handle))
    }
}

/// Parse a user-supplied account address
pub fn parse_account(address: &str) -> Result<Address> {
    Ok(parse_address("address", address)?)
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{RewardTypeInfo, StakingParams, VestingPlan};
    use crate::staking::registry::tests::test_registry;
    use crate::subgraph::{PendingWithdrawalRecord, PositionKind, WithdrawalStatus};
    use crate::units::Wei;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    const USER: &str = "0x00000000000000000000000000000000000000aa";

    #[derive(Default)]
    struct MockChain {
        staked: u128,
        total: u128,
        /// `None` makes `_params` fail
        cooldown: Option<u64>,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl MockChain {
        fn check(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(eyre!("rpc down"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ChainReader for MockChain {
        async fn chain_id(&self) -> Result<u64> {
            Ok(10)
        }
        async fn total_supply(&self, _token: Address) -> Result<Wei> {
            self.check()?;
            Ok(Wei::ZERO)
        }
        async fn balance_of(&self, _token: Address, _owner: Address) -> Result<Wei> {
            self.check()?;
            Ok(Wei::from_u128(self.staked))
        }
        async fn staked_balance(&self, _manager: Address, _account: Address) -> Result<Wei> {
            self.check()?;
            Ok(Wei::from_u128(self.staked))
        }
        async fn total_staked(&self, _manager: Address) -> Result<Wei> {
            self.check()?;
            Ok(Wei::from_u128(self.total))
        }
        async fn reward_type(&self, _manager: Address, index: usize) -> Result<RewardTypeInfo> {
            self.check()?;
            Ok(RewardTypeInfo {
                reward_token: Address::repeat_byte(0x10 + index as u8),
                reward_pool: Address::repeat_byte(0x20 + index as u8),
                is_active: index != 1,
            })
        }
        async fn reward_rate(&self, _reward_pool: Address) -> Result<Wei> {
            self.check()?;
            Ok(Wei::from_u128(1000))
        }
        async fn pool_rewards(&self, _reward_pool: Address) -> Result<Wei> {
            Ok(Wei::ZERO)
        }
        async fn staking_params(&self, _manager: Address) -> Result<StakingParams> {
            self.check()?;
            self.cooldown
                .map(|cooldown_secs| StakingParams { cooldown_secs })
                .ok_or_else(|| eyre!("_params reverted"))
        }
        async fn vesting_plan_count(&self, _locker: Address) -> Result<u64> {
            Ok(0)
        }
        async fn vesting_plan(&self, _locker: Address, _plan_id: u64) -> Result<VestingPlan> {
            Err(eyre!("no plans"))
        }
    }

    #[derive(Default)]
    struct MockSubgraph {
        pending: Option<PendingWithdrawalRecord>,
        stakers: HashMap<String, String>,
        /// Keyed by `(user_entity, id)`
        positions: HashMap<(String, String), Vec<StakingPosition>>,
        fail_positions: bool,
    }

    #[async_trait]
    impl SubgraphClient for MockSubgraph {
        async fn pending_withdrawal(
            &self,
            _user_entity: &str,
            _id: &str,
        ) -> Result<Option<PendingWithdrawalRecord>> {
            Ok(self.pending.clone())
        }
        async fn staked_balances(&self, _user_entity: &str) -> Result<HashMap<String, String>> {
            Ok(self.stakers.clone())
        }
        async fn staking_positions(&self, user_entity: &str, id: &str) -> Result<Vec<StakingPosition>> {
            if self.fail_positions {
                return Err(eyre!("subgraph down"));
            }
            Ok(self
                .positions
                .get(&(user_entity.to_string(), id.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn service(chain: Arc<MockChain>, subgraph: MockSubgraph) -> StakingService {
        StakingService::new(
            Arc::new(test_registry()),
            chain,
            Arc::new(subgraph),
            10,
            Duration::from_secs(60),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_account_state_with_pending_withdrawal() {
        let chain = Arc::new(MockChain {
            staked: 5_000_000_000_000_000_000,
            ..Default::default()
        });
        let subgraph = MockSubgraph {
            pending: Some(PendingWithdrawalRecord {
                amount: Wei::from_u128(1_000_000_000_000_000_000),
                timestamp: 1_700_000_000,
                status: WithdrawalStatus::Pending,
            }),
            ..Default::default()
        };
        let service = service(chain, subgraph);

        let state = service.account_state(StakingNamespace::Kite, USER).await.unwrap();
        let account = state.value().unwrap();
        assert_eq!(account.staked_balance, Wei::from_u128(5_000_000_000_000_000_000));
        assert_eq!(account.pending_withdrawal.as_ref().unwrap().amount, "1");
    }

    #[tokio::test]
    async fn test_account_state_is_cached() {
        let chain = Arc::new(MockChain::default());
        let service = service(chain.clone(), MockSubgraph::default());

        service.account_state(StakingNamespace::Kite, USER).await.unwrap();
        let calls = chain.calls.load(Ordering::SeqCst);
        service.account_state(StakingNamespace::Kite, USER).await.unwrap();
        assert_eq!(chain.calls.load(Ordering::SeqCst), calls);

        service
            .invalidate_after(StakingMutation::Stake, StakingNamespace::Kite, USER)
            .await;
        service.account_state(StakingNamespace::Kite, USER).await.unwrap();
        assert!(chain.calls.load(Ordering::SeqCst) > calls);
    }

    #[tokio::test]
    async fn test_read_failure_is_distinguishable_from_zero() {
        let chain = Arc::new(MockChain::default());
        chain.fail.store(true, Ordering::SeqCst);
        let service = service(chain, MockSubgraph::default());

        let state = service.account_state(StakingNamespace::Kite, USER).await.unwrap();
        assert!(state.is_failed());
        assert!(!state.is_loading());
        assert_eq!(state.value(), Some(&AccountState::default()));
        assert!(state.error().unwrap().contains("rpc down"));
    }

    #[tokio::test]
    async fn test_failure_keeps_last_good_value() {
        let chain = Arc::new(MockChain {
            staked: 7,
            ..Default::default()
        });
        let service = service(chain.clone(), MockSubgraph::default());

        service.refresh_account(StakingNamespace::Kite, USER).await.unwrap();
        chain.fail.store(true, Ordering::SeqCst);

        let state = service.refresh_account(StakingNamespace::Kite, USER).await.unwrap();
        assert!(state.is_failed());
        assert_eq!(state.value().unwrap().staked_balance, Wei::from_u128(7));
    }

    #[tokio::test]
    async fn test_pool_stats_skip_inactive_slot() {
        let chain = Arc::new(MockChain {
            total: 42,
            cooldown: Some(604_800),
            ..Default::default()
        });
        let service = service(chain, MockSubgraph::default());

        let stats = service.pool_stats(StakingNamespace::HaiBoldCurveLp).await.unwrap();
        assert_eq!(
            stats,
            QueryState::Ready(PoolStats {
                total_staked: Wei::from_u128(42),
                reward_rates: vec![(0, Wei::from_u128(1000)), (2, Wei::from_u128(1000))],
                cooldown_secs: 604_800,
            })
        );
    }

    #[tokio::test]
    async fn test_cooldown_comes_from_manager_params() {
        let chain = Arc::new(MockChain {
            cooldown: Some(7 * 86_400),
            ..Default::default()
        });
        let service = service(chain, MockSubgraph::default());

        let cooldown = service.cooldown_secs(StakingNamespace::Kite).await.unwrap();
        assert_eq!(cooldown, 7 * 86_400);

        // Withdrawal initiated 8 days ago is claimable under a 7-day cooldown
        let now = 1_700_000_000;
        let account = AccountState {
            pending_withdrawal: Some(crate::staking::PendingWithdrawal {
                amount: "1".to_string(),
                timestamp: now - 8 * 86_400,
                status: WithdrawalStatus::Pending,
            }),
            ..Default::default()
        };
        assert_eq!(account.cooldown_remaining(cooldown, now), 0);
    }

    #[tokio::test]
    async fn test_cooldown_falls_back_to_config_when_params_fail() {
        let service = service(Arc::new(MockChain::default()), MockSubgraph::default());

        let stats = service.pool_stats(StakingNamespace::Kite).await.unwrap();
        assert_eq!(stats.value().unwrap().cooldown_secs, 21 * 86_400);
        assert_eq!(
            service.cooldown_secs(StakingNamespace::Kite).await.unwrap(),
            21 * 86_400
        );
    }

    #[tokio::test]
    async fn test_position_history_uses_pool_entity_and_id() {
        let history = vec![
            StakingPosition {
                amount: Wei::from_u128(10),
                kind: PositionKind::InitiateWithdrawal,
                timestamp: 2,
            },
            StakingPosition {
                amount: Wei::from_u128(20),
                kind: PositionKind::Stake,
                timestamp: 1,
            },
        ];
        let subgraph = MockSubgraph {
            positions: HashMap::from([(
                (
                    "haiVeloVeloLPStakingUser".to_string(),
                    format!("{}-haivelovelolp", USER),
                ),
                history.clone(),
            )]),
            ..Default::default()
        };
        let service = service(Arc::new(MockChain::default()), subgraph);

        let upper = USER.replace("aa", "AA");
        let state = service
            .position_history(StakingNamespace::HaiVeloVeloLp, &upper)
            .await
            .unwrap();
        assert_eq!(state, QueryState::Ready(history));
    }

    #[tokio::test]
    async fn test_position_history_failure_is_reported() {
        let subgraph = MockSubgraph {
            fail_positions: true,
            ..Default::default()
        };
        let service = service(Arc::new(MockChain::default()), subgraph);

        let state = service
            .position_history(StakingNamespace::Kite, USER)
            .await
            .unwrap();
        assert!(state.is_failed());
        assert_eq!(state.value(), Some(&Vec::new()));
    }

    #[tokio::test]
    async fn test_boost_map_uses_subgraph_stakes() {
        // 100 KITE staked in total, user holds 10 of it
        let chain = Arc::new(MockChain {
            total: 100_000_000_000_000_000_000,
            ..Default::default()
        });
        let subgraph = MockSubgraph {
            stakers: HashMap::from([("0xaa".to_string(), "10".to_string())]),
            ..Default::default()
        };
        let service = service(chain, subgraph);

        let deposits = HashMap::from([("0xAA".to_string(), "50".to_string())]);
        let boosts = service.boost_map(&deposits, TokenAmount(500.0)).await.unwrap();

        // kite share 0.1, deposit share 0.1 -> capped at 2
        assert_eq!(boosts.value().unwrap()["0xaa"], 2.0);
    }

    #[tokio::test]
    async fn test_boost_map_failure_falls_back_to_base() {
        let chain = Arc::new(MockChain::default());
        chain.fail.store(true, Ordering::SeqCst);
        let service = service(chain, MockSubgraph::default());

        let deposits = HashMap::from([("0xaa".to_string(), "50".to_string())]);
        let boosts = service.boost_map(&deposits, TokenAmount(500.0)).await.unwrap();
        assert!(boosts.is_failed());
        assert_eq!(boosts.value().unwrap()["0xaa"], 1.0);
    }

    #[tokio::test]
    async fn test_chain_switch_clears_caches() {
        let chain = Arc::new(MockChain::default());
        let service = service(chain.clone(), MockSubgraph::default());

        service.account_state(StakingNamespace::Kite, USER).await.unwrap();
        let calls = chain.calls.load(Ordering::SeqCst);

        service.set_chain_id(11155420).await;
        assert_eq!(service.chain_id(), 11155420);

        service.account_state(StakingNamespace::Kite, USER).await.unwrap();
        assert!(chain.calls.load(Ordering::SeqCst) > calls);
    }

    #[tokio::test]
    async fn test_malformed_account_is_an_error() {
        let service = service(Arc::new(MockChain::default()), MockSubgraph::default());
        assert!(service.account_state(StakingNamespace::Kite, "0x1234").await.is_err());
    }

    #[tokio::test]
    async fn test_poller_publishes_and_keeps_running_on_failure() {
        let chain = Arc::new(MockChain {
            staked: 3,
            ..Default::default()
        });
        let service = Arc::new(service(chain.clone(), MockSubgraph::default()));

        let (mut rx, handle) = service
            .spawn_account_poller(StakingNamespace::Kite, USER.to_string(), Duration::from_millis(10))
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().value().unwrap().staked_balance, Wei::from_u128(3));

        chain.fail.store(true, Ordering::SeqCst);
        loop {
            rx.changed().await.unwrap();
            if rx.borrow().is_failed() {
                break;
            }
        }
        assert_eq!(rx.borrow().value().unwrap().staked_balance, Wei::from_u128(3));

        chain.fail.store(false, Ordering::SeqCst);
        loop {
            rx.changed().await.unwrap();
            if !rx.borrow().is_failed() {
                break;
            }
        }

        assert!(!handle.is_finished());
        handle.abort();
    }
}
