//! Cached per-account and per-pool staking state

use serde::{Deserialize, Serialize};

use crate::subgraph::WithdrawalStatus;
use crate::units::Wei;

/// Queued withdrawal, amount already in human decimals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub amount: String,
    /// When the withdrawal was initiated (unix seconds)
    pub timestamp: u64,
    pub status: WithdrawalStatus,
}

impl PendingWithdrawal {
    pub fn unlocks_at(&self, cooldown_secs: u64) -> u64 {
        self.timestamp.saturating_add(cooldown_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Staked balance in wei
    pub staked_balance: Wei,
    /// Staking receipt token balance in wei
    pub staking_token_balance: Wei,
    pub pending_withdrawal: Option<PendingWithdrawal>,
}

impl AccountState {
    /// Seconds until the pending withdrawal can be claimed
    pub fn cooldown_remaining(&self, cooldown_secs: u64, now: u64) -> u64 {
        match &self.pending_withdrawal {
            Some(pending) if pending.status == WithdrawalStatus::Pending => {
                pending.unlocks_at(cooldown_secs).saturating_sub(now)
            }
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_staked: Wei,
    /// Per-second rate of each active reward slot, `(slot, rate)`
    pub reward_rates: Vec<(usize, Wei)>,
    /// Withdrawal cooldown reported by the staking manager's `_params`
    pub cooldown_secs: u64,
}

/// Mutating user actions; each invalidates the affected cache entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakingMutation {
    Stake,
    InitiateWithdrawal,
    CancelWithdrawal,
    Withdraw,
    ClaimRewards,
}
