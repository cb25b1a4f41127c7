//! Vault Reward Schedules & APR
//!
//! Each vault collateral type has a fixed daily emission per reward token.
//! A zero amount means "this token is not emitted for this vault" and is
//! dropped before display or math.
//!
//! APR = (Σ daily USD rewards / total boosted USD) × 365 × 100, floored at 0.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::tokens::{HAI, KITE, OP};
use crate::units::{Percent, TokenAmount, UsdValue};

pub const DAYS_PER_YEAR: f64 = 365.0;

// ============================================
// SCHEDULE TABLE
// ============================================

/// (vault symbol, [(reward token, daily amount)])
const VAULT_SCHEDULES: &[(&str, &[(&str, f64)])] = &[
    ("WETH", &[(KITE, 100.0), (OP, 50.0), (HAI, 0.0)]),
    ("WSTETH", &[(KITE, 120.0), (OP, 40.0), (HAI, 0.0)]),
    ("RETH", &[(KITE, 60.0), (OP, 20.0), (HAI, 0.0)]),
    ("OP", &[(KITE, 80.0), (OP, 0.0), (HAI, 0.0)]),
    ("HAIVELO", &[(KITE, 150.0), (OP, 0.0), (HAI, 25.0)]),
    ("APXETH", &[(KITE, 40.0), (OP, 0.0), (HAI, 0.0)]),
    ("ALETH", &[(KITE, 0.0), (OP, 0.0), (HAI, 0.0)]),
    ("WBTC", &[(KITE, 30.0), (OP, 10.0), (HAI, 0.0)]),
];

/// Daily emission of one reward token, in token units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardScheduleEntry {
    pub token: String,
    pub daily_amount: TokenAmount,
}

/// Daily emission already converted to USD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedRewardEntry {
    pub token: String,
    pub daily_usd: UsdValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultAprInput {
    pub schedule: Vec<PricedRewardEntry>,
    pub total_boosted_value_usd: UsdValue,
}

/// Positive-amount entries for `symbol` (case-insensitive); unknown vaults
/// have an empty schedule
pub fn get_vault_schedule(symbol: &str) -> Vec<RewardScheduleEntry> {
    VAULT_SCHEDULES
        .iter()
        .find(|(vault, _)| vault.eq_ignore_ascii_case(symbol.trim()))
        .map(|(_, entries)| {
            entries
                .iter()
                .filter(|(_, amount)| *amount > 0.0)
                .map(|(token, amount)| RewardScheduleEntry {
                    token: token.to_string(),
                    daily_amount: TokenAmount(*amount),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Symbols with a schedule row
pub fn vault_symbols() -> Vec<&'static str> {
    VAULT_SCHEDULES.iter().map(|(vault, _)| *vault).collect()
}

/// Price each entry with externally fetched USD prices (keyed by upper-case
/// symbol). Entries without a price are left out.
pub fn price_schedule(
    schedule: &[RewardScheduleEntry],
    prices: &HashMap<String, UsdValue>,
) -> Vec<PricedRewardEntry> {
    schedule
        .iter()
        .filter_map(|entry| match prices.get(&entry.token.to_uppercase()) {
            Some(price) => Some(PricedRewardEntry {
                token: entry.token.clone(),
                daily_usd: entry.daily_amount.to_usd(*price),
            }),
            None => {
                warn!("No price for reward token {}, skipping", entry.token);
                None
            }
        })
        .collect()
}

/// Annualized percentage yield of a priced schedule
pub fn compute_vault_apr(input: &VaultAprInput) -> Percent {
    let base = input.total_boosted_value_usd.value();
    if base.is_nan() || base <= 0.0 {
        return Percent::ZERO;
    }

    let daily: UsdValue = input.schedule.iter().map(|e| e.daily_usd).sum();
    let apr = daily.value() / base * DAYS_PER_YEAR * 100.0;

    if apr.is_finite() {
        Percent(apr.max(0.0))
    } else {
        Percent::ZERO
    }
}
