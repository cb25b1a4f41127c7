//! Staking reward rates
//!
//! A staking manager exposes a fixed number of reward slots through
//! `rewardTypes(i)`. Inactive slots are skipped; each active slot's reward
//! pool reports a per-second `rewardRate` and the `rewards()` it still holds.

use alloy_primitives::Address;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

use super::registry::StakingConfig;
use crate::chain::ChainReader;
use crate::units::{Percent, UsdValue, Wei};

pub const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 60.0 * 60.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingApyEntry {
    /// Slot index in `rewardTypes`
    pub index: usize,
    pub reward_token: Address,
    pub reward_pool: Address,
    /// Emission per second, in reward-token wei
    pub rate: Wei,
    /// Reward tokens the pool still holds for distribution
    pub remaining: Wei,
}

/// Reward rate of every active slot, in slot order
pub async fn get_staking_apy(
    reader: &dyn ChainReader,
    config: &StakingConfig,
) -> Result<Vec<StakingApyEntry>> {
    let mut entries = Vec::new();

    for index in 0..config.reward_module.reward_slots {
        let slot = reader.reward_type(config.staking_manager, index).await?;
        if !slot.is_active {
            trace!("{}: reward slot {} inactive", config.namespace, index);
            continue;
        }

        let (rate, remaining) = futures::try_join!(
            reader.reward_rate(slot.reward_pool),
            reader.pool_rewards(slot.reward_pool),
        )?;
        entries.push(StakingApyEntry {
            index,
            reward_token: slot.reward_token,
            reward_pool: slot.reward_pool,
            rate,
            remaining,
        });
    }

    debug!(
        "{}: {} active reward slots",
        config.namespace,
        entries.len()
    );
    Ok(entries)
}

/// APR across all active slots:
/// Σ (rate × seconds/year × token price) / staked USD × 100.
/// `token_prices` is keyed by reward token address.
pub fn annualized_staking_apr(
    entries: &[StakingApyEntry],
    reward_decimals: u8,
    token_prices: &HashMap<Address, UsdValue>,
    total_staked_usd: UsdValue,
) -> Percent {
    let base = total_staked_usd.value();
    if base.is_nan() || base <= 0.0 {
        return Percent::ZERO;
    }

    let yearly_usd: UsdValue = entries
        .iter()
        .map(|entry| {
            let price = token_prices
                .get(&entry.reward_token)
                .copied()
                .unwrap_or(UsdValue::ZERO);
            let per_second = entry.rate.to_token_amount(reward_decimals).value();
            UsdValue(per_second * SECONDS_PER_YEAR * price.value())
        })
        .sum();

    let apr = yearly_usd.value() / base * 100.0;
    if apr.is_finite() {
        Percent(apr.max(0.0))
    } else {
        Percent::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{RewardTypeInfo, StakingParams, VestingPlan};
    use crate::staking::registry::tests::test_registry;
    use crate::staking::StakingNamespace;
    use async_trait::async_trait;
    use eyre::eyre;

    /// Chain mock: three reward slots, slot 1 inactive, every pool at the
    /// same rate
    struct SlotChain {
        rate: Wei,
        inactive: Vec<usize>,
    }

    #[async_trait]
    impl ChainReader for SlotChain {
        async fn chain_id(&self) -> Result<u64> {
            Ok(10)
        }
        async fn total_supply(&self, _token: Address) -> Result<Wei> {
            Ok(Wei::ZERO)
        }
        async fn balance_of(&self, _token: Address, _owner: Address) -> Result<Wei> {
            Ok(Wei::ZERO)
        }
        async fn staked_balance(&self, _manager: Address, _account: Address) -> Result<Wei> {
            Ok(Wei::ZERO)
        }
        async fn total_staked(&self, _manager: Address) -> Result<Wei> {
            Ok(Wei::ZERO)
        }
        async fn reward_type(&self, _manager: Address, index: usize) -> Result<RewardTypeInfo> {
            Ok(RewardTypeInfo {
                reward_token: Address::repeat_byte(0x10 + index as u8),
                reward_pool: Address::repeat_byte(0x20 + index as u8),
                is_active: !self.inactive.contains(&index),
            })
        }
        async fn reward_rate(&self, _reward_pool: Address) -> Result<Wei> {
            Ok(self.rate)
        }
        async fn pool_rewards(&self, reward_pool: Address) -> Result<Wei> {
            Ok(Wei::from_u128(reward_pool.0[0] as u128))
        }
        async fn staking_params(&self, _manager: Address) -> Result<StakingParams> {
            Ok(StakingParams { cooldown_secs: 0 })
        }
        async fn vesting_plan_count(&self, _locker: Address) -> Result<u64> {
            Err(eyre!("no vesting"))
        }
        async fn vesting_plan(&self, _locker: Address, _plan_id: u64) -> Result<VestingPlan> {
            Err(eyre!("no vesting"))
        }
    }

    #[tokio::test]
    async fn test_inactive_slot_is_skipped() {
        let registry = test_registry();
        let config = registry.get_config(StakingNamespace::Kite).unwrap();
        let chain = SlotChain {
            rate: Wei::from_u128(1000),
            inactive: vec![1],
        };

        let entries = get_staking_apy(&chain, config).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 0);
        assert_eq!(entries[1].index, 2);
        assert!(entries.iter().all(|e| e.rate == Wei::from_u128(1000)));
        assert_eq!(entries[1].reward_pool, Address::repeat_byte(0x22));
        assert_eq!(entries[1].remaining, Wei::from_u128(0x22));
    }

    #[tokio::test]
    async fn test_all_inactive() {
        let registry = test_registry();
        let config = registry.get_config(StakingNamespace::HaiBoldCurveLp).unwrap();
        let chain = SlotChain {
            rate: Wei::from_u128(5),
            inactive: vec![0, 1, 2],
        };

        assert!(get_staking_apy(&chain, config).await.unwrap().is_empty());
    }

    #[test]
    fn test_annualized_apr() {
        // 1 token/sec at $1 over $31,536,000 staked -> 100%
        let entry = StakingApyEntry {
            index: 0,
            reward_token: Address::repeat_byte(0x10),
            reward_pool: Address::repeat_byte(0x20),
            rate: Wei::from_u128(1_000_000_000_000_000_000),
            remaining: Wei::ZERO,
        };
        let prices = HashMap::from([(Address::repeat_byte(0x10), UsdValue(1.0))]);

        let apr = annualized_staking_apr(&[entry.clone()], 18, &prices, UsdValue(SECONDS_PER_YEAR));
        assert!((apr.value() - 100.0).abs() < 1e-9);

        assert_eq!(
            annualized_staking_apr(&[entry], 18, &prices, UsdValue::ZERO),
            Percent::ZERO
        );
    }
}
