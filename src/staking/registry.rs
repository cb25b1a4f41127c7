//! Staking Config Registry
//!
//! One immutable `StakingConfig` per pool, looked up by namespace. Contract
//! addresses come from the environment and are validated once, when the
//! registry is built. A pool with a missing or malformed address keeps its
//! error and fails on lookup; the other pools resolve as usual.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================
// CONSTANTS
// ============================================

/// Withdrawal cooldown shared by all pools (21 days)
pub const DEFAULT_COOLDOWN_SECS: u64 = 21 * 24 * 60 * 60;

/// Reward slots exposed by a staking manager's `rewardTypes(i)`
pub const DEFAULT_REWARD_SLOTS: usize = 3;

// ============================================
// ERRORS
// ============================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown staking namespace: {0}")]
    UnknownNamespace(String),

    #[error("{namespace}: required address {var} is not set")]
    MissingAddress {
        namespace: StakingNamespace,
        var: String,
    },

    #[error("{var}: malformed address {value:?} (expected 0x + 40 hex digits)")]
    MalformedAddress { var: String, value: String },
}

// ============================================
// NAMESPACE
// ============================================

/// Unique pool id; every cache key is scoped by it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StakingNamespace {
    /// Single-asset KITE staking
    Kite,
    /// HAI/BOLD Curve LP staking
    HaiBoldCurveLp,
    /// haiVELO/VELO Velodrome LP staking
    HaiVeloVeloLp,
}

impl StakingNamespace {
    pub const ALL: [StakingNamespace; 3] = [
        StakingNamespace::Kite,
        StakingNamespace::HaiBoldCurveLp,
        StakingNamespace::HaiVeloVeloLp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StakingNamespace::Kite => "kite",
            StakingNamespace::HaiBoldCurveLp => "hai-bold-curve-lp",
            StakingNamespace::HaiVeloVeloLp => "hai-velo-velo-lp",
        }
    }

    /// Prefix of the environment variables holding this pool's addresses
    pub fn env_prefix(&self) -> &'static str {
        match self {
            StakingNamespace::Kite => "KITE",
            StakingNamespace::HaiBoldCurveLp => "HAI_BOLD_CURVE_LP",
            StakingNamespace::HaiVeloVeloLp => "HAI_VELO_VELO_LP",
        }
    }
}

impl fmt::Display for StakingNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StakingNamespace {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StakingNamespace::ALL
            .into_iter()
            .find(|ns| ns.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownNamespace(s.to_string()))
    }
}

// ============================================
// DESCRIPTOR PIECES
// ============================================

/// Where the USD TVL of an LP pool comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TvlSource {
    Curve,
    Velodrome,
}

impl fmt::Display for TvlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TvlSource::Curve => write!(f, "curve"),
            TvlSource::Velodrome => write!(f, "velodrome"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TvlMetadata {
    pub source: TvlSource,
    pub pool_address: Address,
}

/// How a subgraph user-entity id is derived from an account address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserIdScheme {
    /// `0xabc...` lower-cased
    Address,
    /// `0xabc...-<pool_key>` lower-cased
    Composite { pool_key: String },
}

impl UserIdScheme {
    /// Derive the subgraph id. Ids are stored lower-case, so any casing of
    /// the same address yields the same id.
    pub fn id_for(&self, address: &str) -> String {
        let address = address.trim().to_lowercase();
        match self {
            UserIdScheme::Address => address,
            UserIdScheme::Composite { pool_key } => {
                format!("{}-{}", address, pool_key.to_lowercase())
            }
        }
    }
}

/// Subgraph entity names for one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgraphEntities {
    /// e.g. `stakingUser`
    pub user_entity: String,
    /// e.g. `stakingStatistic`
    pub statistic_entity: String,
    pub id_scheme: UserIdScheme,
}

impl SubgraphEntities {
    pub fn id_for_user(&self, address: &str) -> String {
        self.id_scheme.id_for(address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardModule {
    /// Number of `rewardTypes(i)` slots to scan
    pub reward_slots: usize,
}

// ============================================
// STAKING CONFIG
// ============================================

/// Immutable per-pool descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingConfig {
    pub namespace: StakingNamespace,
    pub display_name: String,

    /// Token deposited by stakers (KITE, or the LP token)
    pub staked_token: Address,
    /// Receipt token minted on stake (stKITE and friends)
    pub staking_token: Address,
    /// Staking manager contract
    pub staking_manager: Address,

    pub decimals: u8,
    pub cooldown_secs: u64,
    pub boost_eligible: bool,
    pub tvl: Option<TvlMetadata>,
    pub subgraph: SubgraphEntities,
    pub reward_module: RewardModule,
}

// ============================================
// REGISTRY
// ============================================

#[derive(Debug, Clone)]
pub struct StakingRegistry {
    configs: HashMap<StakingNamespace, Result<StakingConfig, ConfigError>>,
}

impl StakingRegistry {
    /// Build every pool from process environment (after `.env` is loaded)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build every pool using `lookup` to resolve variable names. Pools that
    /// fail validation keep their error for `get_config`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut configs = HashMap::new();
        for namespace in StakingNamespace::ALL {
            let config = build_config(namespace, &lookup);
            match &config {
                Ok(_) => debug!("Resolved staking config for {}", namespace),
                Err(e) => warn!("Staking config for {} unavailable: {}", namespace, e),
            }
            configs.insert(namespace, config);
        }
        Self { configs }
    }

    /// Pure lookup; never touches the environment
    pub fn get_config(&self, namespace: StakingNamespace) -> Result<&StakingConfig, ConfigError> {
        match self.configs.get(&namespace) {
            Some(Ok(config)) => Ok(config),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ConfigError::UnknownNamespace(namespace.to_string())),
        }
    }

    /// String-keyed lookup (CLI, HTTP)
    pub fn get_config_by_name(&self, name: &str) -> Result<&StakingConfig, ConfigError> {
        let namespace: StakingNamespace = name.parse()?;
        self.get_config(namespace)
    }

    /// Namespaces whose config resolved
    pub fn namespaces(&self) -> Vec<StakingNamespace> {
        let mut namespaces: Vec<_> = self
            .configs
            .iter()
            .filter(|(_, config)| config.is_ok())
            .map(|(ns, _)| *ns)
            .collect();
        namespaces.sort();
        namespaces
    }

    /// Validation errors of the pools that did not resolve
    pub fn errors(&self) -> Vec<(StakingNamespace, ConfigError)> {
        let mut errors: Vec<_> = self
            .configs
            .iter()
            .filter_map(|(ns, config)| config.as_ref().err().map(|e| (*ns, e.clone())))
            .collect();
        errors.sort_by_key(|(ns, _)| *ns);
        errors
    }
}

fn build_config<F>(namespace: StakingNamespace, lookup: &F) -> Result<StakingConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = namespace.env_prefix();
    let require = |suffix: &str| -> Result<Address, ConfigError> {
        let var = format!("{}_{}", prefix, suffix);
        let value = lookup(&var)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingAddress {
                namespace,
                var: var.clone(),
            })?;
        parse_address(&var, &value)
    };

    let staked_token = require("STAKED_TOKEN_ADDRESS")?;
    let staking_token = require("STAKING_TOKEN_ADDRESS")?;
    let staking_manager = require("STAKING_MANAGER_ADDRESS")?;

    let reward_module = RewardModule {
        reward_slots: DEFAULT_REWARD_SLOTS,
    };

    let config = match namespace {
        StakingNamespace::Kite => StakingConfig {
            namespace,
            display_name: "KITE Staking".to_string(),
            staked_token,
            staking_token,
            staking_manager,
            decimals: 18,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            boost_eligible: false,
            tvl: None,
            subgraph: SubgraphEntities {
                user_entity: "stakingUser".to_string(),
                statistic_entity: "stakingStatistic".to_string(),
                id_scheme: UserIdScheme::Address,
            },
            reward_module,
        },
        StakingNamespace::HaiBoldCurveLp => StakingConfig {
            namespace,
            display_name: "HAI/BOLD Curve LP".to_string(),
            staked_token,
            staking_token,
            staking_manager,
            decimals: 18,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            boost_eligible: true,
            tvl: Some(TvlMetadata {
                source: TvlSource::Curve,
                pool_address: require("POOL_ADDRESS")?,
            }),
            subgraph: SubgraphEntities {
                user_entity: "haiBoldCurveLPStakingUser".to_string(),
                statistic_entity: "haiBoldCurveLPStakingStatistic".to_string(),
                id_scheme: UserIdScheme::Composite {
                    pool_key: "haiboldcurvelp".to_string(),
                },
            },
            reward_module,
        },
        StakingNamespace::HaiVeloVeloLp => StakingConfig {
            namespace,
            display_name: "haiVELO/VELO Velodrome LP".to_string(),
            staked_token,
            staking_token,
            staking_manager,
            decimals: 18,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            boost_eligible: true,
            tvl: Some(TvlMetadata {
                source: TvlSource::Velodrome,
                pool_address: require("POOL_ADDRESS")?,
            }),
            subgraph: SubgraphEntities {
                user_entity: "haiVeloVeloLPStakingUser".to_string(),
                statistic_entity: "haiVeloVeloLPStakingStatistic".to_string(),
                id_scheme: UserIdScheme::Composite {
                    pool_key: "haivelovelolp".to_string(),
                },
            },
            reward_module,
        },
    };

    Ok(config)
}

/// `0x` followed by exactly 40 hex digits
pub fn parse_address(var: &str, value: &str) -> Result<Address, ConfigError> {
    let value = value.trim();
    let malformed = || ConfigError::MalformedAddress {
        var: var.to_string(),
        value: value.to_string(),
    };

    if value.len() != 42 || !value.starts_with("0x") {
        return Err(malformed());
    }
    if !value[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed());
    }

    Address::from_str(value).map_err(|_| malformed())
}

// ============================================
// TESTS
// ============================================
