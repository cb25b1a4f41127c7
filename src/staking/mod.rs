//! Staking pools: per-pool config, boost and reward math, withdrawal sync,
//! and the cached service the CLI and poller read through.

pub mod apy;
pub mod boost;
pub mod registry;
pub mod service;
pub mod types;
pub mod withdrawal;

pub use apy::{get_staking_apy, StakingApyEntry};
pub use boost::{calculate_boost_map, calculate_user_boost, BoostResult};
pub use registry::{ConfigError, StakingConfig, StakingNamespace, StakingRegistry, TvlSource};
pub use service::{QueryState, StakingService};
pub use types::{AccountState, PendingWithdrawal, PoolStats, StakingMutation};
pub use withdrawal::{PendingWithdrawalSync, SyncOutcome, UserEntityRef};
