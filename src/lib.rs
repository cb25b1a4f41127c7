//! KITE staking & rewards aggregation
//!
//! Read-side aggregation for the KITE / HAI staking pools on Optimism:
//! staking manager reads, subgraph withdrawals, reward schedules and APRs,
//! boost maps, LP TVL and the token supply endpoints.

pub mod cache;
pub mod chain;
pub mod config;
pub mod price_oracle;
pub mod rewards;
pub mod staking;
pub mod state;
pub mod subgraph;
pub mod supply;
pub mod tokens;
pub mod tvl;
pub mod units;
