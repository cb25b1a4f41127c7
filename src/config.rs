//! Runtime Configuration
//!
//! Network endpoints, price-feed settings, cache windows and the supply
//! endpoint's listen address. Pool contract addresses live in the staking
//! registry instead (see `staking::registry`).

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::price_oracle::{COINGECKO_API_URL, DEFILLAMA_API_URL};

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // ========== Network Settings ==========
    /// Optimism RPC URL
    pub rpc_url: String,

    /// Chain ID (10 = Optimism)
    pub chain_id: u64,

    /// Staking subgraph GraphQL endpoint
    pub subgraph_url: String,

    // ========== Price Feeds ==========
    /// Primary price feed (DefiLlama coins API)
    pub price_primary_url: String,

    /// Secondary price feed (CoinGecko simple price)
    pub price_fallback_url: String,

    /// Last-resort prices when both feeds fail
    pub kite_fallback_price_usd: f64,
    pub hai_fallback_price_usd: f64,
    pub op_fallback_price_usd: f64,

    // ========== Cache Windows ==========
    /// Per-account staking state (volatile)
    pub account_cache_secs: u64,

    /// Pool-wide totals and reward rates
    pub pool_cache_secs: u64,

    /// Token prices
    pub price_cache_secs: u64,

    /// Fixed polling interval for watchers
    pub poll_interval_secs: u64,

    // ========== Supply Endpoint ==========
    pub supply_listen_addr: String,

    /// Treasury / incentives holders excluded from KITE circulating supply
    pub kite_excluded_holders: Vec<String>,

    /// Holders excluded from HAI circulating supply
    pub hai_excluded_holders: Vec<String>,

    /// Vesting plans contract holding locked KITE
    pub vesting_locker_address: Option<String>,

    /// HAI token (KITE's address comes from the staking registry)
    pub hai_token_address: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|s| {
            s.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: env_or("CHAIN_ID", defaults.chain_id),
            subgraph_url: env::var("SUBGRAPH_URL").unwrap_or(defaults.subgraph_url),

            // Price feeds
            price_primary_url: env::var("PRICE_PRIMARY_URL").unwrap_or(defaults.price_primary_url),
            price_fallback_url: env::var("PRICE_FALLBACK_URL")
                .unwrap_or(defaults.price_fallback_url),
            kite_fallback_price_usd: env_or("KITE_FALLBACK_PRICE_USD", defaults.kite_fallback_price_usd),
            hai_fallback_price_usd: env_or("HAI_FALLBACK_PRICE_USD", defaults.hai_fallback_price_usd),
            op_fallback_price_usd: env_or("OP_FALLBACK_PRICE_USD", defaults.op_fallback_price_usd),

            // Cache windows
            account_cache_secs: env_or("ACCOUNT_CACHE_SECS", defaults.account_cache_secs),
            pool_cache_secs: env_or("POOL_CACHE_SECS", defaults.pool_cache_secs),
            price_cache_secs: env_or("PRICE_CACHE_SECS", defaults.price_cache_secs),
            poll_interval_secs: env_or("POLL_INTERVAL_SECS", defaults.poll_interval_secs),

            // Supply endpoint
            supply_listen_addr: env::var("SUPPLY_LISTEN_ADDR")
                .unwrap_or(defaults.supply_listen_addr),
            kite_excluded_holders: env_list("KITE_EXCLUDED_HOLDERS"),
            hai_excluded_holders: env_list("HAI_EXCLUDED_HOLDERS"),
            vesting_locker_address: env::var("VESTING_LOCKER_ADDRESS")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            hai_token_address: env::var("HAI_TOKEN_ADDRESS")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// TOML file when `path` is given, environment otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Constant prices used when both feeds fail
    pub fn fallback_prices(&self) -> HashMap<String, f64> {
        HashMap::from([
            ("KITE".to_string(), self.kite_fallback_price_usd),
            ("HAI".to_string(), self.hai_fallback_price_usd),
            ("OP".to_string(), self.op_fallback_price_usd),
        ])
    }

    /// Validate configuration before any network use
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!("Invalid RPC_URL - please set a valid Optimism RPC URL"));
        }

        if self.subgraph_url.is_empty() || self.subgraph_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!("Invalid SUBGRAPH_URL - please set the staking subgraph endpoint"));
        }

        if self.account_cache_secs == 0 || self.pool_cache_secs == 0 || self.price_cache_secs == 0 {
            return Err(eyre::eyre!("Cache windows must be at least 1 second"));
        }

        if self.poll_interval_secs == 0 {
            return Err(eyre::eyre!("POLL_INTERVAL_SECS must be at least 1 second"));
        }

        for (name, price) in self.fallback_prices() {
            if !price.is_finite() || price < 0.0 {
                return Err(eyre::eyre!(
                    "{}_FALLBACK_PRICE_USD must be a non-negative number (currently {})",
                    name,
                    price
                ));
            }
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              KITE STAKING - CONFIGURATION                  ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Subgraph:          {:^40} ║",
            if self.subgraph_url.is_empty() { "✗ Not Set" } else { "✓ Configured" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ PRICE FALLBACKS                                            ║");
        println!("║ • KITE:            ${:<38.4} ║", self.kite_fallback_price_usd);
        println!("║ • HAI:             ${:<38.4} ║", self.hai_fallback_price_usd);
        println!("║ • OP:              ${:<38.4} ║", self.op_fallback_price_usd);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CACHE WINDOWS                                              ║");
        println!("║ • Account:         {:>38}s ║", self.account_cache_secs);
        println!("║ • Pool:            {:>38}s ║", self.pool_cache_secs);
        println!("║ • Price:           {:>38}s ║", self.price_cache_secs);
        println!("║ • Poll interval:   {:>38}s ║", self.poll_interval_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SUPPLY ENDPOINT                                            ║");
        println!("║ • Listen:          {:^40} ║", self.supply_listen_addr);
        println!("║ • Vesting locker:  {:^40} ║",
            if self.vesting_locker_address.is_some() { "✓ Configured" } else { "✗ Not Set" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://mainnet.optimism.io".to_string(),
            chain_id: 10,
            subgraph_url: String::new(),
            price_primary_url: DEFILLAMA_API_URL.to_string(),
            price_fallback_url: COINGECKO_API_URL.to_string(),
            kite_fallback_price_usd: 10.0,
            hai_fallback_price_usd: 1.0,
            op_fallback_price_usd: 1.5,
            account_cache_secs: 15,
            pool_cache_secs: 60,
            price_cache_secs: 300,
            poll_interval_secs: 15,
            supply_listen_addr: "127.0.0.1:3000".to_string(),
            kite_excluded_holders: vec![],
            hai_excluded_holders: vec![],
            vesting_locker_address: None,
            hai_token_address: None,
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.chain_id, 10);
        assert_eq!(config.account_cache_secs, 15);
        assert_eq!(config.price_cache_secs, 300);
    }

    #[test]
    fn test_validate_requires_subgraph() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());

        let config = AppConfig {
            subgraph_url: "https://api.example.com/subgraphs/hai".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let config = AppConfig {
            subgraph_url: "https://api.example.com/subgraphs/hai".to_string(),
            pool_cache_secs: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_prefers_file() {
        let path = env::temp_dir().join(format!("kite-staking-{}.toml", std::process::id()));
        let config = AppConfig {
            chain_id: 11155420,
            poll_interval_secs: 5,
            ..AppConfig::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(loaded.chain_id, 11155420);
        assert_eq!(loaded.poll_interval_secs, 5);
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig {
            kite_excluded_holders: vec!["0x0000000000000000000000000000000000000001".to_string()],
            ..AppConfig::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.kite_excluded_holders, config.kite_excluded_holders);
        assert_eq!(parsed.supply_listen_addr, config.supply_listen_addr);
    }
}
