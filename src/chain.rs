//! Chain Readers
//!
//! Read-only contract accessors behind the `ChainReader` trait, so the
//! aggregation code can be driven by a mock in tests. `AlloyChainReader` is
//! the RPC-backed implementation.

use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use eyre::{eyre, Result};
use tracing::trace;

use crate::units::Wei;

// ============================================
// CONTRACT INTERFACES
// ============================================

sol! {
    interface IERC20 {
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
    }

    interface IStakingManager {
        function stakedBalances(address account) external view returns (uint256);
        function totalStaked() external view returns (uint256);
        function rewardTypes(uint256 id) external view returns (
            address rewardToken, address rewardPool, bool isActive, uint256 rewardIntegral
        );
        function _params() external view returns (uint256 cooldownPeriod);
    }

    interface IRewardPool {
        function rewardRate() external view returns (uint256);
        function rewards() external view returns (uint256);
    }

    /// Vesting plans NFT (plan ids start at 1)
    interface IVestingPlans {
        function totalSupply() external view returns (uint256);
        function plans(uint256 planId) external view returns (
            address token, uint256 amount, uint256 start, uint256 cliff, uint256 rate, uint256 period
        );
    }
}

// ============================================
// TYPES
// ============================================

/// One `rewardTypes(i)` slot of a staking manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardTypeInfo {
    pub reward_token: Address,
    pub reward_pool: Address,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakingParams {
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VestingPlan {
    pub token: Address,
    pub amount: Wei,
}

// ============================================
// READER TRAIT
// ============================================

#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn total_supply(&self, token: Address) -> Result<Wei>;

    async fn balance_of(&self, token: Address, owner: Address) -> Result<Wei>;

    async fn staked_balance(&self, manager: Address, account: Address) -> Result<Wei>;

    async fn total_staked(&self, manager: Address) -> Result<Wei>;

    async fn reward_type(&self, manager: Address, index: usize) -> Result<RewardTypeInfo>;

    async fn reward_rate(&self, reward_pool: Address) -> Result<Wei>;

    /// Undistributed rewards held by a reward pool
    async fn pool_rewards(&self, reward_pool: Address) -> Result<Wei>;

    async fn staking_params(&self, manager: Address) -> Result<StakingParams>;

    async fn vesting_plan_count(&self, locker: Address) -> Result<u64>;

    async fn vesting_plan(&self, locker: Address, plan_id: u64) -> Result<VestingPlan>;
}

// ============================================
// ALLOY IMPLEMENTATION
// ============================================

pub struct AlloyChainReader {
    rpc_url: String,
}

impl AlloyChainReader {
    pub fn new(rpc_url: String) -> Self {
        Self { rpc_url }
    }

    /// Single `eth_call` against `to`
    async fn eth_call(&self, to: Address, calldata: Vec<u8>) -> Result<Bytes> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);

        let tx = TransactionRequest::default().to(to).input(calldata.into());

        trace!("eth_call -> {:?}", to);
        provider
            .call(tx)
            .await
            .map_err(|e| eyre!("eth_call to {:?} failed: {}", to, e))
    }
}

#[async_trait]
impl ChainReader for AlloyChainReader {
    async fn chain_id(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);
        Ok(provider.get_chain_id().await?)
    }

    async fn total_supply(&self, token: Address) -> Result<Wei> {
        let output = self
            .eth_call(token, IERC20::totalSupplyCall {}.abi_encode())
            .await?;
        let supply = IERC20::totalSupplyCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode totalSupply: {}", e))?;
        Ok(Wei(supply))
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<Wei> {
        let output = self
            .eth_call(token, IERC20::balanceOfCall { account: owner }.abi_encode())
            .await?;
        let balance = IERC20::balanceOfCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode balanceOf: {}", e))?;
        Ok(Wei(balance))
    }

    async fn staked_balance(&self, manager: Address, account: Address) -> Result<Wei> {
        let output = self
            .eth_call(
                manager,
                IStakingManager::stakedBalancesCall { account }.abi_encode(),
            )
            .await?;
        let staked = IStakingManager::stakedBalancesCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode stakedBalances: {}", e))?;
        Ok(Wei(staked))
    }

    async fn total_staked(&self, manager: Address) -> Result<Wei> {
        let output = self
            .eth_call(manager, IStakingManager::totalStakedCall {}.abi_encode())
            .await?;
        let total = IStakingManager::totalStakedCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode totalStaked: {}", e))?;
        Ok(Wei(total))
    }

    async fn reward_type(&self, manager: Address, index: usize) -> Result<RewardTypeInfo> {
        let output = self
            .eth_call(
                manager,
                IStakingManager::rewardTypesCall { id: U256::from(index) }.abi_encode(),
            )
            .await?;
        let slot = IStakingManager::rewardTypesCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode rewardTypes({}): {}", index, e))?;
        Ok(RewardTypeInfo {
            reward_token: slot.rewardToken,
            reward_pool: slot.rewardPool,
            is_active: slot.isActive,
        })
    }

    async fn reward_rate(&self, reward_pool: Address) -> Result<Wei> {
        let output = self
            .eth_call(reward_pool, IRewardPool::rewardRateCall {}.abi_encode())
            .await?;
        let rate = IRewardPool::rewardRateCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode rewardRate: {}", e))?;
        Ok(Wei(rate))
    }

    async fn pool_rewards(&self, reward_pool: Address) -> Result<Wei> {
        let output = self
            .eth_call(reward_pool, IRewardPool::rewardsCall {}.abi_encode())
            .await?;
        let rewards = IRewardPool::rewardsCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode rewards: {}", e))?;
        Ok(Wei(rewards))
    }

    async fn staking_params(&self, manager: Address) -> Result<StakingParams> {
        let output = self
            .eth_call(manager, IStakingManager::_paramsCall {}.abi_encode())
            .await?;
        let cooldown = IStakingManager::_paramsCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode _params: {}", e))?;
        let cooldown_secs = u64::try_from(cooldown)
            .map_err(|_| eyre!("cooldown period out of range: {}", cooldown))?;
        Ok(StakingParams { cooldown_secs })
    }

    async fn vesting_plan_count(&self, locker: Address) -> Result<u64> {
        let output = self
            .eth_call(locker, IVestingPlans::totalSupplyCall {}.abi_encode())
            .await?;
        let count = IVestingPlans::totalSupplyCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode plan count: {}", e))?;
        u64::try_from(count).map_err(|_| eyre!("plan count out of range: {}", count))
    }

    async fn vesting_plan(&self, locker: Address, plan_id: u64) -> Result<VestingPlan> {
        let output = self
            .eth_call(
                locker,
                IVestingPlans::plansCall { planId: U256::from(plan_id) }.abi_encode(),
            )
            .await?;
        let plan = IVestingPlans::plansCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode plans({}): {}", plan_id, e))?;
        Ok(VestingPlan {
            token: plan.token,
            amount: Wei(plan.amount),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_types_calldata() {
        let calldata = IStakingManager::rewardTypesCall { id: U256::from(2) }.abi_encode();
        // 4-byte selector + one uint256 word
        assert_eq!(calldata.len(), 36);
        assert_eq!(calldata[35], 2);
    }

    #[test]
    fn test_selectors() {
        let erc20 = IERC20::totalSupplyCall::SELECTOR;
        let plans = IVestingPlans::totalSupplyCall::SELECTOR;
        // Same signature, same selector
        assert_eq!(erc20, plans);
        assert_ne!(
            IStakingManager::stakedBalancesCall::SELECTOR,
            IERC20::balanceOfCall::SELECTOR
        );
    }
}
