//! Token Supply Endpoints
//!
//! Total and circulating supply for KITE and HAI:
//!
//! ```text
//! circulating = totalSupply
//!             - Σ balanceOf(excluded holder)
//!             - Σ plan.amount   (vesting plans locking this token)
//! ```
//!
//! Everything is summed in wei and converted to decimals once, at the end.

pub mod server;

use alloy_primitives::Address;
use eyre::{eyre, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::chain::ChainReader;
use crate::config::AppConfig;
use crate::staking::registry::parse_address;
use crate::staking::{StakingNamespace, StakingRegistry};
use crate::units::Wei;

/// Concurrent `plans(id)` reads
const VESTING_READ_CONCURRENCY: usize = 8;

pub const CACHE_CONTROL: &str = "s-maxage=3600, stale-while-revalidate=30";

// ============================================
// CONFIG
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupplyToken {
    Kite,
    Hai,
}

impl SupplyToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupplyToken::Kite => "kite",
            SupplyToken::Hai => "hai",
        }
    }
}

impl fmt::Display for SupplyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown supply token: {0} (expected kite or hai)")]
pub struct UnknownSupplyToken(pub String);

impl FromStr for SupplyToken {
    type Err = UnknownSupplyToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kite" => Ok(SupplyToken::Kite),
            "hai" => Ok(SupplyToken::Hai),
            _ => Err(UnknownSupplyToken(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyConfig {
    pub token: Address,
    pub decimals: u8,
    /// Treasury, incentives and other non-circulating holders
    pub excluded: Vec<Address>,
    /// Vesting plans contract whose locked amounts are non-circulating
    pub vesting_locker: Option<Address>,
}

impl SupplyConfig {
    /// KITE: token address from the registry, vesting locker from config
    pub fn kite(config: &AppConfig, registry: &StakingRegistry) -> Result<Self> {
        let kite = registry.get_config(StakingNamespace::Kite)?;
        Ok(Self {
            token: kite.staked_token,
            decimals: kite.decimals,
            excluded: parse_holders("KITE_EXCLUDED_HOLDERS", &config.kite_excluded_holders)?,
            vesting_locker: config
                .vesting_locker_address
                .as_deref()
                .map(|v| parse_address("VESTING_LOCKER_ADDRESS", v))
                .transpose()?,
        })
    }

    pub fn hai(config: &AppConfig) -> Result<Self> {
        let token = config
            .hai_token_address
            .as_deref()
            .ok_or_else(|| eyre!("HAI_TOKEN_ADDRESS is not set"))?;
        Ok(Self {
            token: parse_address("HAI_TOKEN_ADDRESS", token)?,
            decimals: 18,
            excluded: parse_holders("HAI_EXCLUDED_HOLDERS", &config.hai_excluded_holders)?,
            vesting_locker: None,
        })
    }
}

fn parse_holders(var: &str, holders: &[String]) -> Result<Vec<Address>> {
    holders
        .iter()
        .map(|h| parse_address(var, h).map_err(Into::into))
        .collect()
}

// ============================================
// COMPUTATION
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyBreakdown {
    pub total: Wei,
    pub excluded: Wei,
    pub vesting: Wei,
    pub circulating: Wei,
}

/// Flat response body, decimal numbers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupplyResponse {
    pub total_supply: f64,
    pub circulating_supply: f64,
}

impl SupplyBreakdown {
    pub fn to_response(&self, decimals: u8) -> SupplyResponse {
        SupplyResponse {
            total_supply: self.total.to_token_amount(decimals).value(),
            circulating_supply: self.circulating.to_token_amount(decimals).value(),
        }
    }
}

/// Sum of `plan.amount` over every plan that locks `token`
async fn vesting_locked(chain: &dyn ChainReader, locker: Address, token: Address) -> Result<Wei> {
    let count = chain.vesting_plan_count(locker).await?;
    debug!("vesting locker {} holds {} plans", locker, count);

    // Plan ids are 1-based NFT ids
    stream::iter(1..=count)
        .map(|plan_id| chain.vesting_plan(locker, plan_id))
        .buffer_unordered(VESTING_READ_CONCURRENCY)
        .try_fold(Wei::ZERO, |sum, plan| async move {
            Ok(if plan.token == token { sum + plan.amount } else { sum })
        })
        .await
}

pub async fn compute_supply(chain: &dyn ChainReader, config: &SupplyConfig) -> Result<SupplyBreakdown> {
    let total_fut = chain.total_supply(config.token);
    let excluded_fut = futures::future::try_join_all(
        config
            .excluded
            .iter()
            .map(|holder| chain.balance_of(config.token, *holder)),
    );
    let vesting_fut = async {
        match config.vesting_locker {
            Some(locker) => vesting_locked(chain, locker, config.token).await,
            None => Ok(Wei::ZERO),
        }
    };

    let (total, excluded, vesting) = futures::try_join!(total_fut, excluded_fut, vesting_fut)?;

    let excluded: Wei = excluded.into_iter().fold(Wei::ZERO, |sum, b| sum + b);
    let locked = excluded + vesting;
    if locked > total {
        warn!(
            "non-circulating {} exceeds total supply {} for {}",
            locked, total, config.token
        );
    }

    Ok(SupplyBreakdown {
        total,
        excluded,
        vesting,
        circulating: total.saturating_sub(locked),
    })
}

// ============================================
// HANDLER
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", "text/plain".to_string())],
            body: body.into(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Supply as a plain-text JSON object; 500 with a message on read failure
pub async fn handle_supply(
    chain: &dyn ChainReader,
    config: &SupplyConfig,
    cache_control: bool,
) -> HttpResponse {
    let breakdown = match compute_supply(chain, config).await {
        Ok(b) => b,
        Err(e) => {
            warn!("supply read failed for {}: {}", config.token, e);
            return HttpResponse::text(500, "Failed to fetch supply data");
        }
    };

    let body = match serde_json::to_string(&breakdown.to_response(config.decimals)) {
        Ok(body) => body,
        Err(e) => {
            warn!("supply encode failed: {}", e);
            return HttpResponse::text(500, "Failed to encode supply data");
        }
    };

    let mut response = HttpResponse::text(200, body);
    if cache_control {
        response.headers.push(("Cache-Control", CACHE_CONTROL.to_string()));
    }
    response
}

// ============================================
// TESTS
// ============================================
