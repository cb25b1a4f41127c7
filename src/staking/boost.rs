//! Boost Map Calculator
//!
//! A depositor's reward share is amplified by how much KITE they stake
//! relative to their deposit:
//!
//! ```text
//! deposit_share = deposit / total_deposited
//! kite_share    = staked  / total_staked
//! boost         = min(kite_share / deposit_share + 1, 2)
//! ```
//!
//! Zero totals yield a zero share instead of dividing by zero.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::units::TokenAmount;

/// Upper bound of any boost multiplier
pub const MAX_BOOST: f64 = 2.0;

/// Boost of a depositor with no KITE staked
pub const BASE_BOOST: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostResult {
    pub boost: f64,
    pub kite_share: f64,
    pub deposit_share: f64,
}

/// `part / total`, or 0 when the total is not positive
fn share(part: f64, total: f64) -> f64 {
    if total > 0.0 && part.is_finite() {
        (part / total).max(0.0)
    } else {
        0.0
    }
}

fn boost_from_shares(kite_share: f64, deposit_share: f64) -> f64 {
    if deposit_share > 0.0 {
        (kite_share / deposit_share + 1.0).clamp(BASE_BOOST, MAX_BOOST)
    } else {
        BASE_BOOST
    }
}

fn parse_or_zero(address: &str, raw: &str) -> f64 {
    match TokenAmount::parse(raw) {
        Ok(amount) => amount.value(),
        Err(e) => {
            warn!("Ignoring unparsable amount for {}: {}", address, e);
            0.0
        }
    }
}

/// Boost for every address in `deposit_mapping`, keyed by lower-cased
/// address. Depositors missing from `staking_data` get the base boost.
pub fn calculate_boost_map(
    deposit_mapping: &HashMap<String, String>,
    staking_data: &HashMap<String, String>,
    total_staked: TokenAmount,
    total_deposited: TokenAmount,
) -> HashMap<String, f64> {
    // Chain addresses are checksummed, subgraph ids are lower-case
    let staked_by_address: HashMap<String, &str> = staking_data
        .iter()
        .map(|(address, balance)| (address.to_lowercase(), balance.as_str()))
        .collect();

    deposit_mapping
        .iter()
        .map(|(address, deposit)| {
            let address = address.to_lowercase();

            let deposit_amount = parse_or_zero(&address, deposit);
            let staked_amount = staked_by_address
                .get(&address)
                .map(|raw| parse_or_zero(&address, raw))
                .unwrap_or(0.0);

            let deposit_share = share(deposit_amount, total_deposited.value());
            let kite_share = share(staked_amount, total_staked.value());

            (address, boost_from_shares(kite_share, deposit_share))
        })
        .collect()
}

/// Boost for a single account. With neither a deposit nor a stake there is
/// nothing to boost and the result is 0.
pub fn calculate_user_boost(
    user_staked: TokenAmount,
    total_staked: TokenAmount,
    user_deposit: TokenAmount,
    total_deposited: TokenAmount,
) -> BoostResult {
    let kite_share = share(user_staked.value(), total_staked.value());
    let deposit_share = share(user_deposit.value(), total_deposited.value());

    if user_deposit.value() <= 0.0 && user_staked.value() <= 0.0 {
        return BoostResult {
            boost: 0.0,
            kite_share,
            deposit_share,
        };
    }

    BoostResult {
        boost: boost_from_shares(kite_share, deposit_share),
        kite_share,
        deposit_share,
    }
}
