//! Diagnostic tool - Check staking configuration
//!
//! Run with: cargo run --bin diagnose

use kite_staking::staking::registry::parse_address;
use kite_staking::staking::{StakingNamespace, StakingRegistry};
use std::env;

fn status(var: &str) -> String {
    match env::var(var) {
        Ok(value) if value.trim().is_empty() => "❌ Empty".to_string(),
        Ok(value) => match parse_address(var, &value) {
            Ok(_) => "✅ Set".to_string(),
            Err(_) => format!("⚠️  Malformed ({})", value.trim()),
        },
        Err(_) => "❌ Not set".to_string(),
    }
}

/// Long URLs keep their first 30 and last 15 characters
fn shorten(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 50 {
        return value.to_string();
    }
    let head: String = chars[..30].iter().collect();
    let tail: String = chars[chars.len() - 15..].iter().collect();
    format!("{}...{}", head, tail)
}

fn main() {
    println!("🔍 KITE STAKING DIAGNOSTIC CHECK\n");

    // Load .env
    dotenvy::dotenv().ok();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("CHAIN_ID", "10", "Chain the pools live on"),
        ("ACCOUNT_CACHE_SECS", "15", "Account data cache window"),
        ("POOL_CACHE_SECS", "60", "Pool totals cache window"),
        ("PRICE_CACHE_SECS", "300", "Token price cache window"),
        ("POLL_INTERVAL_SECS", "15", "Watcher poll interval"),
        ("SUPPLY_LISTEN_ADDR", "127.0.0.1:3000", "Supply endpoint address"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let is_default = env::var(key).is_err();
        let marker = if is_default { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    for key in ["RPC_URL", "SUBGRAPH_URL"] {
        let value = env::var(key).unwrap_or_else(|_| "NOT SET".to_string());
        println!("  {}: {}", key, shorten(&value));
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                  STAKING POOLS                     ");
    println!("═══════════════════════════════════════════════════\n");

    for namespace in StakingNamespace::ALL {
        println!("  {}", namespace);
        let prefix = namespace.env_prefix();
        let mut suffixes = vec![
            "STAKED_TOKEN_ADDRESS",
            "STAKING_TOKEN_ADDRESS",
            "STAKING_MANAGER_ADDRESS",
        ];
        if namespace != StakingNamespace::Kite {
            suffixes.push("POOL_ADDRESS");
        }
        for suffix in suffixes {
            let var = format!("{}_{}", prefix, suffix);
            println!("    {:<40} {}", var, status(&var));
        }
        println!();
    }

    println!("═══════════════════════════════════════════════════");
    println!("                  SUPPLY ENDPOINTS                  ");
    println!("═══════════════════════════════════════════════════\n");

    println!("  HAI_TOKEN_ADDRESS:      {}", status("HAI_TOKEN_ADDRESS"));
    println!("  VESTING_LOCKER_ADDRESS: {}", status("VESTING_LOCKER_ADDRESS"));
    for key in ["KITE_EXCLUDED_HOLDERS", "HAI_EXCLUDED_HOLDERS"] {
        let count = env::var(key)
            .map(|v| v.split(',').filter(|p| !p.trim().is_empty()).count())
            .unwrap_or(0);
        println!("  {}: {} holders", key, count);
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    let registry = StakingRegistry::from_env();
    println!("  ✅ Registry resolved {} pools", registry.namespaces().len());
    for (namespace, e) in registry.errors() {
        println!("  ❌ {} unavailable: {}", namespace, e);
    }

    println!("\n✅ Diagnostic complete!\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_keeps_short_values() {
        assert_eq!(shorten("https://mainnet.optimism.io"), "https://mainnet.optimism.io");
    }

    #[test]
    fn test_shorten_handles_multibyte_urls() {
        let url = format!("https://rpc.example/{}", "ñ".repeat(60));
        let short = shorten(&url);
        assert_eq!(short.chars().count(), 48);
        assert!(short.starts_with("https://rpc.example/"));
        assert!(short.ends_with(&"ñ".repeat(15)));
    }
}
