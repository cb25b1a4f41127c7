//! Token definitions for KITE staking
//!
//! Reward tokens emitted by the schedules, plus the collateral symbols the
//! vault schedule table is keyed by. Price-feed ids are CoinGecko ids, which
//! the DefiLlama coins API also accepts (`coingecko:<id>`).

use alloy_primitives::{address, Address};
use std::collections::HashMap;

/// Represents a token we're tracking
#[derive(Debug, Clone)]
pub struct Token {
    pub symbol: &'static str,
    pub address: Option<Address>,
    pub decimals: u8,
    pub coingecko_id: &'static str,
    pub category: TokenCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCategory {
    /// Emitted by reward schedules (KITE, OP, HAI)
    Reward,

    /// Vault collateral
    Collateral,

    /// LP receipt tokens staked in the LP pools
    LiquidityPool,
}

// ============================================
// REWARD TOKENS
// ============================================

pub const KITE: &str = "KITE";
pub const OP: &str = "OP";
pub const HAI: &str = "HAI";

/// OP predeploy (same on every OP-stack chain)
pub const OP_TOKEN: Address = address!("4200000000000000000000000000000000000042");

/// WETH predeploy
pub const WETH_TOKEN: Address = address!("4200000000000000000000000000000000000006");

pub fn reward_tokens() -> Vec<Token> {
    vec![
        Token {
            symbol: KITE,
            address: None,
            decimals: 18,
            coingecko_id: "kite",
            category: TokenCategory::Reward,
        },
        Token {
            symbol: OP,
            address: Some(OP_TOKEN),
            decimals: 18,
            coingecko_id: "optimism",
            category: TokenCategory::Reward,
        },
        Token {
            symbol: HAI,
            address: None,
            decimals: 18,
            coingecko_id: "let-s-get-hai",
            category: TokenCategory::Reward,
        },
    ]
}

// ============================================
// COLLATERAL / LP
// ============================================

pub fn collateral_tokens() -> Vec<Token> {
    let collateral = |symbol, decimals, coingecko_id, address| Token {
        symbol,
        address,
        decimals,
        coingecko_id,
        category: TokenCategory::Collateral,
    };

    vec![
        collateral("WETH", 18, "weth", Some(WETH_TOKEN)),
        collateral("WSTETH", 18, "wrapped-steth", None),
        collateral("RETH", 18, "rocket-pool-eth", None),
        collateral("OP", 18, "optimism", Some(OP_TOKEN)),
        collateral("HAIVELO", 18, "velodrome-finance", None),
        collateral("APXETH", 18, "dinero-apxeth", None),
        collateral("ALETH", 18, "alchemix-eth", None),
        collateral("WBTC", 8, "wrapped-bitcoin", None),
    ]
}

pub fn lp_tokens() -> Vec<Token> {
    vec![
        Token {
            symbol: "HAI-BOLD-CRV",
            address: None,
            decimals: 18,
            coingecko_id: "",
            category: TokenCategory::LiquidityPool,
        },
        Token {
            symbol: "HAIVELO-VELO",
            address: None,
            decimals: 18,
            coingecko_id: "",
            category: TokenCategory::LiquidityPool,
        },
    ]
}

// ============================================
// LOOKUPS
// ============================================

pub fn all_tokens() -> Vec<Token> {
    let mut tokens = reward_tokens();
    tokens.extend(collateral_tokens());
    tokens.extend(lp_tokens());
    tokens
}

/// Case-insensitive symbol lookup; the first match wins (OP is both a
/// reward token and a collateral)
pub fn get_token(symbol: &str) -> Option<Token> {
    all_tokens()
        .into_iter()
        .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
}

pub fn coingecko_id(symbol: &str) -> Option<&'static str> {
    get_token(symbol)
        .map(|t| t.coingecko_id)
        .filter(|id| !id.is_empty())
}

/// Symbol map for tokens with a fixed address
pub fn build_symbol_map() -> HashMap<Address, &'static str> {
    let mut map = HashMap::new();

    for token in all_tokens() {
        if let Some(address) = token.address {
            map.entry(address).or_insert(token.symbol);
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_tokens_have_price_ids() {
        for token in reward_tokens() {
            assert!(!token.coingecko_id.is_empty(), "{} has no price id", token.symbol);
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(get_token("kite").map(|t| t.symbol), Some(KITE));
        assert_eq!(get_token("wStEtH").map(|t| t.decimals), Some(18));
        assert!(get_token("DOGE").is_none());
    }

    #[test]
    fn test_lp_tokens_are_not_priced() {
        assert_eq!(coingecko_id("HAI-BOLD-CRV"), None);
        assert_eq!(coingecko_id("OP"), Some("optimism"));
    }

    #[test]
    fn test_symbol_map() {
        let symbols = build_symbol_map();
        assert_eq!(symbols.get(&OP_TOKEN), Some(&"OP"));
        assert_eq!(symbols.get(&WETH_TOKEN), Some(&"WETH"));
    }
}
