//! Token Price Oracle - DefiLlama + CoinGecko
//!
//! Fetches USD prices for reward tokens. Tries the primary feed (DefiLlama
//! coins API), then the secondary feed (CoinGecko simple price), then a
//! configured constant. Each tier failure is a warning since a fallback
//! always exists.
//!
//! API: https://coins.llama.fi/prices/current/coingecko:<id>

use async_trait::async_trait;
use eyre::{eyre, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::tokens;
use crate::units::UsdValue;

// ============================================
// CONSTANTS
// ============================================

pub const DEFILLAMA_API_URL: &str = "https://coins.llama.fi/prices/current";

pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Timeout for API calls
const API_TIMEOUT_SECS: u64 = 5;

// ============================================
// API RESPONSE TYPES
// ============================================

#[derive(Debug, Deserialize)]
struct LlamaResponse {
    coins: HashMap<String, LlamaCoin>,
}

#[derive(Debug, Deserialize)]
struct LlamaCoin {
    price: f64,
}

/// `{ "<id>": { "usd": 1.23 } }`
type CoinGeckoResponse = HashMap<String, HashMap<String, f64>>;

// ============================================
// PRICE INFO
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceTier {
    Primary,
    Secondary,
    Fallback,
}

impl std::fmt::Display for PriceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceTier::Primary => write!(f, "DefiLlama"),
            PriceTier::Secondary => write!(f, "CoinGecko"),
            PriceTier::Fallback => write!(f, "Fallback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceInfo {
    pub symbol: String,
    pub usd: UsdValue,
    pub fetched_at: Instant,
    pub tier: PriceTier,
}

impl PriceInfo {
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() > ttl
    }
}

// ============================================
// PRICE SOURCES
// ============================================

#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_usd(&self, coingecko_id: &str) -> Result<f64>;
}

pub struct DefiLlamaSource {
    http_client: Client,
    base_url: String,
}

impl DefiLlamaSource {
    pub fn new(base_url: String) -> Result<Self> {
        Ok(Self {
            http_client: http_client()?,
            base_url,
        })
    }
}

#[async_trait]
impl PriceSource for DefiLlamaSource {
    fn name(&self) -> &'static str {
        "DefiLlama"
    }

    async fn fetch_usd(&self, coingecko_id: &str) -> Result<f64> {
        let key = format!("coingecko:{}", coingecko_id);
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key);

        let response: LlamaResponse = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .coins
            .get(&key)
            .map(|c| c.price)
            .ok_or_else(|| eyre!("DefiLlama has no price for {}", key))
    }
}

pub struct CoinGeckoSource {
    http_client: Client,
    base_url: String,
}

impl CoinGeckoSource {
    pub fn new(base_url: String) -> Result<Self> {
        Ok(Self {
            http_client: http_client()?,
            base_url,
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn name(&self) -> &'static str {
        "CoinGecko"
    }

    async fn fetch_usd(&self, coingecko_id: &str) -> Result<f64> {
        let url = format!(
            "{}?ids={}&vs_currencies=usd",
            self.base_url.trim_end_matches('/'),
            coingecko_id
        );

        let response: CoinGeckoResponse = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .get(coingecko_id)
            .and_then(|quotes| quotes.get("usd"))
            .copied()
            .ok_or_else(|| eyre!("CoinGecko has no price for {}", coingecko_id))
    }
}

fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(API_TIMEOUT_SECS))
        .build()?)
}

// ============================================
// PRICE ORACLE
// ============================================

pub struct PriceOracle {
    primary: Box<dyn PriceSource>,
    secondary: Box<dyn PriceSource>,
    /// Last-resort constant per symbol (upper-case)
    fallbacks: HashMap<String, f64>,
    ttl: Duration,
    cache: Arc<RwLock<HashMap<String, PriceInfo>>>,
}

impl PriceOracle {
    pub fn new(
        primary: Box<dyn PriceSource>,
        secondary: Box<dyn PriceSource>,
        fallbacks: HashMap<String, f64>,
        ttl: Duration,
    ) -> Self {
        let fallbacks = fallbacks
            .into_iter()
            .map(|(symbol, price)| (symbol.to_uppercase(), price))
            .collect();

        Self {
            primary,
            secondary,
            fallbacks,
            ttl,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Oracle wired to the public DefiLlama / CoinGecko endpoints
    pub fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        Ok(Self::new(
            Box::new(DefiLlamaSource::new(config.price_primary_url.clone())?),
            Box::new(CoinGeckoSource::new(config.price_fallback_url.clone())?),
            config.fallback_prices(),
            Duration::from_secs(config.price_cache_secs),
        ))
    }

    /// Get current USD price (with caching)
    pub async fn get_price(&self, symbol: &str) -> PriceInfo {
        let symbol = symbol.to_uppercase();

        // Check cache first
        {
            let cache = self.cache.read().await;
            if let Some(info) = cache.get(&symbol) {
                if !info.is_stale(self.ttl) {
                    trace!("Using cached {} price: {}", symbol, info.usd);
                    return info.clone();
                }
            }
        }

        let info = self.fetch_price(&symbol).await;

        // Constants are not cached so the feeds are retried next call
        if info.tier != PriceTier::Fallback {
            let mut cache = self.cache.write().await;
            cache.insert(symbol, info.clone());
        }

        info
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    /// Symbols currently held in the cache, fresh or not
    pub async fn cached_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.cache.read().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Prices for several symbols, fetched concurrently
    pub async fn get_prices(&self, symbols: &[&str]) -> HashMap<String, UsdValue> {
        let infos = futures::future::join_all(symbols.iter().map(|s| self.get_price(s))).await;
        infos.into_iter().map(|i| (i.symbol, i.usd)).collect()
    }

    /// Primary, then secondary, then constant
    async fn fetch_price(&self, symbol: &str) -> PriceInfo {
        let make = |usd: f64, tier: PriceTier| PriceInfo {
            symbol: symbol.to_string(),
            usd: UsdValue(usd),
            fetched_at: Instant::now(),
            tier,
        };

        match tokens::coingecko_id(symbol) {
            Some(id) => {
                for (source, tier) in [
                    (&self.primary, PriceTier::Primary),
                    (&self.secondary, PriceTier::Secondary),
                ] {
                    match source.fetch_usd(id).await.and_then(validate_price) {
                        Ok(usd) => {
                            debug!("💲 {} from {}: ${:.4}", symbol, source.name(), usd);
                            return make(usd, tier);
                        }
                        Err(e) => {
                            warn!("{} price fetch for {} failed: {}", source.name(), symbol, e);
                        }
                    }
                }
            }
            None => {
                warn!("No price feed id for {}", symbol);
            }
        }

        let usd = self.fallbacks.get(symbol).copied().unwrap_or(0.0);
        warn!("Using fallback {} price: ${:.4}", symbol, usd);
        make(usd, PriceTier::Fallback)
    }
}

fn validate_price(price: f64) -> Result<f64> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(eyre!("implausible price {}", price))
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct FixedSource {
        price: Option<f64>,
        calls: Arc<AtomicUsize>,
    }

    impl FixedSource {
        pub(crate) fn ok(price: f64) -> Self {
            Self {
                price: Some(price),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                price: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl PriceSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_usd(&self, _coingecko_id: &str) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.price.ok_or_else(|| eyre!("down"))
        }
    }

    fn source(price: Option<f64>) -> (Box<dyn PriceSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(FixedSource {
                price,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn oracle(primary: Option<f64>, secondary: Option<f64>) -> (PriceOracle, Arc<AtomicUsize>) {
        let (p, p_calls) = source(primary);
        let (s, _) = source(secondary);
        let fallbacks = HashMap::from([("kite".to_string(), 10.0)]);
        (
            PriceOracle::new(p, s, fallbacks, Duration::from_secs(60)),
            p_calls,
        )
    }

    #[tokio::test]
    async fn test_primary_price_is_cached() {
        let (oracle, calls) = oracle(Some(12.5), None);

        let first = oracle.get_price("KITE").await;
        let second = oracle.get_price("kite").await;

        assert_eq!(first.tier, PriceTier::Primary);
        assert_eq!(second.usd, UsdValue(12.5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_secondary_when_primary_fails() {
        let (oracle, _) = oracle(None, Some(11.0));
        let info = oracle.get_price("KITE").await;
        assert_eq!(info.tier, PriceTier::Secondary);
        assert_eq!(info.usd, UsdValue(11.0));
    }

    #[tokio::test]
    async fn test_constant_when_both_fail() {
        let (oracle, calls) = oracle(None, None);

        let info = oracle.get_price("KITE").await;
        assert_eq!(info.tier, PriceTier::Fallback);
        assert_eq!(info.usd, UsdValue(10.0));

        // Fallback values are not cached
        oracle.get_price("KITE").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_implausible_price_falls_through() {
        let (oracle, _) = oracle(Some(-1.0), Some(f64::NAN));
        let info = oracle.get_price("KITE").await;
        assert_eq!(info.tier, PriceTier::Fallback);
    }

    #[tokio::test]
    async fn test_unknown_symbol_without_fallback_is_zero() {
        let (oracle, calls) = oracle(Some(1.0), Some(1.0));
        let info = oracle.get_price("DOGE").await;
        assert_eq!(info.usd, UsdValue::ZERO);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let (oracle, calls) = oracle(Some(3.0), None);
        oracle.get_price("KITE").await;
        assert_eq!(oracle.cached_symbols().await, vec!["KITE".to_string()]);

        oracle.clear_cache().await;
        assert!(oracle.cached_symbols().await.is_empty());
        oracle.get_price("KITE").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
