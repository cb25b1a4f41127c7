//! Pending Withdrawal Synchronizer
//!
//! Pulls a user's `pendingWithdrawal` from the subgraph and merges it into
//! the cached account state for `(namespace, address)`, leaving the other
//! fields alone. Two entity shapes are supported: the pool's configured
//! user entity, or an explicit entity + id scheme for multi-pool LP
//! entities.

use eyre::Result;
use tracing::{debug, trace};

use super::registry::{StakingConfig, UserIdScheme};
use super::types::{AccountState, PendingWithdrawal};
use crate::cache::{CacheKey, TtlCache};
use crate::subgraph::SubgraphClient;

/// Which subgraph entity holds the user's withdrawal
#[derive(Debug, Clone, Copy)]
pub enum UserEntityRef<'a> {
    /// The pool's configured user entity and id scheme
    Configured,
    Explicit {
        user_entity: &'a str,
        id_scheme: &'a UserIdScheme,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No address, nothing queried
    Skipped,
    /// Upstream matched the cache
    Unchanged,
    Updated,
}

pub struct PendingWithdrawalSync<'a> {
    subgraph: &'a dyn SubgraphClient,
    accounts: &'a TtlCache<CacheKey, AccountState>,
}

impl<'a> PendingWithdrawalSync<'a> {
    pub fn new(subgraph: &'a dyn SubgraphClient, accounts: &'a TtlCache<CacheKey, AccountState>) -> Self {
        Self { subgraph, accounts }
    }

    /// One subgraph lookup, one merge. Repeating it with unchanged upstream
    /// data leaves the cache untouched.
    pub async fn sync(
        &self,
        config: &StakingConfig,
        address: Option<&str>,
        entity: UserEntityRef<'_>,
    ) -> Result<SyncOutcome> {
        let Some(address) = address.filter(|a| !a.trim().is_empty()) else {
            trace!("{}: no address, skipping withdrawal sync", config.namespace);
            return Ok(SyncOutcome::Skipped);
        };

        let (user_entity, id) = match entity {
            UserEntityRef::Configured => (
                config.subgraph.user_entity.as_str(),
                config.subgraph.id_for_user(address),
            ),
            UserEntityRef::Explicit {
                user_entity,
                id_scheme,
            } => (user_entity, id_scheme.id_for(address)),
        };

        let record = self.subgraph.pending_withdrawal(user_entity, &id).await?;

        let pending = record.map(|r| PendingWithdrawal {
            amount: r.amount.to_decimal_string(config.decimals),
            timestamp: r.timestamp,
            status: r.status,
        });

        let key = CacheKey::account(config.namespace, address);
        let changed = self
            .accounts
            .merge(key, |state| state.pending_withdrawal = pending)
            .await;

        if changed {
            debug!("{}: pending withdrawal updated for {}", config.namespace, address);
            Ok(SyncOutcome::Updated)
        } else {
            Ok(SyncOutcome::Unchanged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staking::registry::tests::test_registry;
    use crate::staking::StakingNamespace;
    use crate::subgraph::{PendingWithdrawalRecord, StakingPosition, WithdrawalStatus};
    use crate::units::Wei;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSubgraph {
        record: Option<PendingWithdrawalRecord>,
        calls: AtomicUsize,
        last_query: Mutex<Option<(String, String)>>,
    }

    #[async_trait]
    impl SubgraphClient for RecordingSubgraph {
        async fn pending_withdrawal(
            &self,
            user_entity: &str,
            id: &str,
        ) -> Result<Option<PendingWithdrawalRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_query.lock().unwrap() = Some((user_entity.to_string(), id.to_string()));
            Ok(self.record.clone())
        }

        async fn staked_balances(&self, _user_entity: &str) -> Result<HashMap<String, String>> {
            Ok(HashMap::new())
        }

        async fn staking_positions(&self, _user_entity: &str, _id: &str) -> Result<Vec<StakingPosition>> {
            Ok(Vec::new())
        }
    }

    fn accounts() -> TtlCache<CacheKey, AccountState> {
        TtlCache::new(Duration::from_secs(60), Arc::new(AtomicU64::new(10)))
    }

    fn record() -> PendingWithdrawalRecord {
        PendingWithdrawalRecord {
            amount: Wei::from_dec_str("2500000000000000000").unwrap(),
            timestamp: 1_700_000_000,
            status: WithdrawalStatus::Pending,
        }
    }

    const USER: &str = "0xAbCdEf0123456789abcdef0123456789ABCDEF01";

    #[tokio::test]
    async fn test_sync_merges_without_clobbering() {
        let registry = test_registry();
        let config = registry.get_config(StakingNamespace::Kite).unwrap();
        let subgraph = RecordingSubgraph {
            record: Some(record()),
            ..Default::default()
        };
        let cache = accounts();

        let key = CacheKey::account(StakingNamespace::Kite, USER);
        cache
            .insert(
                key.clone(),
                AccountState {
                    staked_balance: Wei::from_u128(42),
                    ..AccountState::default()
                },
            )
            .await;

        let sync = PendingWithdrawalSync::new(&subgraph, &cache);
        let outcome = sync.sync(config, Some(USER), UserEntityRef::Configured).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Updated);

        let state = cache.get_fresh(&key).await.unwrap();
        assert_eq!(state.staked_balance, Wei::from_u128(42));
        let pending = state.pending_withdrawal.unwrap();
        assert_eq!(pending.amount, "2.5");
        assert_eq!(pending.timestamp, 1_700_000_000);

        let (entity, id) = subgraph.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(entity, "stakingUser");
        assert_eq!(id, USER.to_lowercase());
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let registry = test_registry();
        let config = registry.get_config(StakingNamespace::HaiBoldCurveLp).unwrap();
        let subgraph = RecordingSubgraph {
            record: Some(record()),
            ..Default::default()
        };
        let cache = accounts();
        let sync = PendingWithdrawalSync::new(&subgraph, &cache);
        let key = CacheKey::account(config.namespace, USER);

        sync.sync(config, Some(USER), UserEntityRef::Configured).await.unwrap();
        let first = cache.get_any(&key).await;

        let outcome = sync.sync(config, Some(USER), UserEntityRef::Configured).await.unwrap();
        let second = cache.get_any(&key).await;

        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(first, second);
        assert_eq!(subgraph.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sync_without_address_is_noop() {
        let registry = test_registry();
        let config = registry.get_config(StakingNamespace::Kite).unwrap();
        let subgraph = RecordingSubgraph::default();
        let cache = accounts();
        let sync = PendingWithdrawalSync::new(&subgraph, &cache);

        let outcome = sync.sync(config, None, UserEntityRef::Configured).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(subgraph.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_absent_entity_clears_pending() {
        let registry = test_registry();
        let config = registry.get_config(StakingNamespace::Kite).unwrap();
        let cache = accounts();
        let key = CacheKey::account(config.namespace, USER);

        let with_record = RecordingSubgraph {
            record: Some(record()),
            ..Default::default()
        };
        PendingWithdrawalSync::new(&with_record, &cache)
            .sync(config, Some(USER), UserEntityRef::Configured)
            .await
            .unwrap();

        let empty = RecordingSubgraph::default();
        let outcome = PendingWithdrawalSync::new(&empty, &cache)
            .sync(config, Some(USER), UserEntityRef::Configured)
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Updated);
        assert_eq!(cache.get_any(&key).await.unwrap().pending_withdrawal, None);
    }

    #[tokio::test]
    async fn test_explicit_entity_uses_its_id_scheme() {
        let registry = test_registry();
        let config = registry.get_config(StakingNamespace::HaiVeloVeloLp).unwrap();
        let subgraph = RecordingSubgraph::default();
        let cache = accounts();
        let scheme = UserIdScheme::Composite {
            pool_key: "velo".to_string(),
        };

        PendingWithdrawalSync::new(&subgraph, &cache)
            .sync(
                config,
                Some(USER),
                UserEntityRef::Explicit {
                    user_entity: "haiVeloVeloLPStakingUser",
                    id_scheme: &scheme,
                },
            )
            .await
            .unwrap();

        let (entity, id) = subgraph.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(entity, "haiVeloVeloLPStakingUser");
        assert_eq!(id, format!("{}-velo", USER.to_lowercase()));
    }
}
