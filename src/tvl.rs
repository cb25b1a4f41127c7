//! LP TVL Estimator
//!
//! USD total value locked for LP staking pools, dispatched on the pool's
//! configured `TvlSource`. Both sources currently report fixed placeholder
//! figures until the pool-side readers land.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::staking::registry::{StakingConfig, TvlSource};
use crate::units::UsdValue;

/// Placeholder TVL for Curve pools
pub const CURVE_PLACEHOLDER_TVL_USD: f64 = 2_000_000.0;

/// Placeholder TVL for Velodrome pools
pub const VELODROME_PLACEHOLDER_TVL_USD: f64 = 1_500_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tvl {
    pub usd: UsdValue,
}

#[derive(Debug, Clone, Default)]
pub struct LpTvlEstimator;

impl LpTvlEstimator {
    pub fn new() -> Self {
        Self
    }

    /// `None` for pools without TVL metadata (single-asset staking)
    pub fn get_tvl(&self, config: &StakingConfig) -> Option<Tvl> {
        let meta = config.tvl.as_ref()?;

        let usd = match meta.source {
            TvlSource::Curve => CURVE_PLACEHOLDER_TVL_USD,
            TvlSource::Velodrome => VELODROME_PLACEHOLDER_TVL_USD,
        };

        trace!(
            "{}: {} pool {} tvl ${:.0}",
            config.namespace,
            meta.source,
            meta.pool_address,
            usd
        );
        Some(Tvl { usd: UsdValue(usd) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staking::registry::tests::test_registry;
    use crate::staking::StakingNamespace;

    #[test]
    fn test_single_asset_pool_has_no_tvl() {
        let registry = test_registry();
        let kite = registry.get_config(StakingNamespace::Kite).unwrap();
        assert_eq!(LpTvlEstimator::new().get_tvl(kite), None);
    }

    #[test]
    fn test_placeholder_by_source() {
        let registry = test_registry();
        let estimator = LpTvlEstimator::new();

        let curve = registry.get_config(StakingNamespace::HaiBoldCurveLp).unwrap();
        assert_eq!(
            estimator.get_tvl(curve),
            Some(Tvl {
                usd: UsdValue(2_000_000.0)
            })
        );

        let velo = registry.get_config(StakingNamespace::HaiVeloVeloLp).unwrap();
        assert_eq!(
            estimator.get_tvl(velo),
            Some(Tvl {
                usd: UsdValue(1_500_000.0)
            })
        );
    }

    #[test]
    fn test_source_comes_from_metadata() {
        let registry = test_registry();
        let mut config = registry.get_config(StakingNamespace::HaiBoldCurveLp).unwrap().clone();
        if let Some(meta) = config.tvl.as_mut() {
            meta.source = TvlSource::Velodrome;
        }
        assert_eq!(
            LpTvlEstimator::new().get_tvl(&config).map(|t| t.usd),
            Some(UsdValue(VELODROME_PLACEHOLDER_TVL_USD))
        );
    }
}
