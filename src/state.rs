//! Application state
//!
//! Everything long-lived (registry, readers, caches, price oracle) is built
//! once here and passed down explicitly. Server contexts that need a clean
//! slate per request call `reset_caches`.

use eyre::{eyre, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::chain::{AlloyChainReader, ChainReader};
use crate::config::AppConfig;
use crate::price_oracle::PriceOracle;
use crate::staking::{StakingRegistry, StakingService};
use crate::subgraph::{HttpSubgraphClient, SubgraphClient};
use crate::supply::server::SupplyContext;
use crate::supply::{SupplyConfig, SupplyToken};

pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<StakingRegistry>,
    pub chain: Arc<dyn ChainReader>,
    pub subgraph: Arc<dyn SubgraphClient>,
    pub prices: PriceOracle,
    pub staking: Arc<StakingService>,
}

impl AppState {
    /// Wire explicit collaborators together
    pub fn init(
        config: AppConfig,
        registry: StakingRegistry,
        chain: Arc<dyn ChainReader>,
        subgraph: Arc<dyn SubgraphClient>,
        prices: PriceOracle,
    ) -> Self {
        let registry = Arc::new(registry);
        let staking = Arc::new(StakingService::new(
            registry.clone(),
            chain.clone(),
            subgraph.clone(),
            config.chain_id,
            Duration::from_secs(config.account_cache_secs),
            Duration::from_secs(config.pool_cache_secs),
        ));

        Self {
            config,
            registry,
            chain,
            subgraph,
            prices,
            staking,
        }
    }

    /// Production wiring: RPC, subgraph and price feeds from `config`
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let registry = StakingRegistry::from_env();

        let chain: Arc<dyn ChainReader> = Arc::new(AlloyChainReader::new(config.rpc_url.clone()));
        let subgraph: Arc<dyn SubgraphClient> =
            Arc::new(HttpSubgraphClient::new(config.subgraph_url.clone())?);
        let prices = PriceOracle::from_config(&config)?;

        info!("Application state ready (chain {})", config.chain_id);
        Ok(Self::init(config, registry, chain, subgraph, prices))
    }

    /// Fail if the RPC endpoint serves a different chain than configured
    pub async fn verify_chain(&self) -> Result<()> {
        let rpc_chain = self.chain.chain_id().await?;
        if rpc_chain != self.config.chain_id {
            return Err(eyre!(
                "RPC serves chain {} but CHAIN_ID is {}",
                rpc_chain,
                self.config.chain_id
            ));
        }
        info!("RPC chain id {} matches configuration", rpc_chain);
        Ok(())
    }

    /// Drop every cached read
    pub async fn reset_caches(&self) {
        self.staking.clear_caches().await;
        self.prices.clear_cache().await;
    }

    /// Supply tokens that can be served; misconfigured ones are logged and
    /// left out
    pub fn supply_context(&self) -> SupplyContext {
        let mut configs = HashMap::new();

        match SupplyConfig::kite(&self.config, &self.registry) {
            Ok(kite) => {
                configs.insert(SupplyToken::Kite, kite);
            }
            Err(e) => warn!("KITE supply disabled: {}", e),
        }
        match SupplyConfig::hai(&self.config) {
            Ok(hai) => {
                configs.insert(SupplyToken::Hai, hai);
            }
            Err(e) => warn!("HAI supply disabled: {}", e),
        }

        SupplyContext {
            chain: self.chain.clone(),
            configs,
            cache_control: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_oracle::tests::FixedSource;
    use crate::staking::registry::tests::test_registry;
    use crate::staking::{QueryState, StakingNamespace};
    use crate::supply::tests::LedgerChain;
    use crate::subgraph::{PendingWithdrawalRecord, StakingPosition};
    use async_trait::async_trait;

    struct EmptySubgraph;

    #[async_trait]
    impl SubgraphClient for EmptySubgraph {
        async fn pending_withdrawal(
            &self,
            _user_entity: &str,
            _id: &str,
        ) -> Result<Option<PendingWithdrawalRecord>> {
            Ok(None)
        }
        async fn staked_balances(&self, _user_entity: &str) -> Result<HashMap<String, String>> {
            Ok(HashMap::new())
        }
        async fn staking_positions(&self, _user_entity: &str, _id: &str) -> Result<Vec<StakingPosition>> {
            Ok(Vec::new())
        }
    }

    fn state() -> AppState {
        state_on(AppConfig::default())
    }

    fn state_on(config: AppConfig) -> AppState {
        let prices = PriceOracle::new(
            Box::new(FixedSource::ok(2.0)),
            Box::new(FixedSource::failing()),
            config.fallback_prices(),
            Duration::from_secs(60),
        );
        AppState::init(
            config,
            test_registry(),
            Arc::new(LedgerChain::sample()),
            Arc::new(EmptySubgraph),
            prices,
        )
    }

    #[tokio::test]
    async fn test_init_wires_service() {
        let state = state();
        assert_eq!(state.staking.chain_id(), 10);

        let pool = state.staking.pool_stats(StakingNamespace::Kite).await.unwrap();
        // LedgerChain has no reward slots, so the read fails with a default
        assert!(matches!(pool, QueryState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_supply_context_skips_unconfigured_tokens() {
        let state = state();
        let ctx = state.supply_context();
        assert!(ctx.configs.contains_key(&SupplyToken::Kite));
        assert!(!ctx.configs.contains_key(&SupplyToken::Hai));
    }

    #[tokio::test]
    async fn test_verify_chain() {
        assert!(state().verify_chain().await.is_ok());

        let config = AppConfig {
            chain_id: 11155420,
            ..AppConfig::default()
        };
        let err = state_on(config).verify_chain().await.unwrap_err();
        assert!(err.to_string().contains("11155420"));
    }

    #[tokio::test]
    async fn test_reset_caches() {
        let state = state();
        state.prices.get_price("KITE").await;
        state.reset_caches().await;
        assert!(state.prices.cached_symbols().await.is_empty());
    }
}
