//! KITE Staking - reward, boost and supply aggregation CLI
//!
//! Run with: cargo run -- <COMMAND>

use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kite_staking::config::AppConfig;
use kite_staking::price_oracle::PriceOracle;
use kite_staking::rewards::{compute_vault_apr, get_vault_schedule, price_schedule, VaultAprInput};
use kite_staking::staking::apy::annualized_staking_apr;
use kite_staking::staking::{AccountState, QueryState, StakingNamespace, StakingRegistry};
use kite_staking::state::AppState;
use kite_staking::supply::server;
use kite_staking::supply::{compute_supply, SupplyToken};
use kite_staking::tokens::{self, HAI, KITE};
use kite_staking::units::{UsdValue, Wei};

#[derive(Parser)]
#[command(name = "kite-staking", version, about = "KITE / HAI staking aggregation")]
struct Cli {
    /// Read settings from a TOML file instead of the environment
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Vault reward APR from the daily emission schedule
    Apr {
        /// Vault collateral symbol (WETH, WSTETH, ...)
        symbol: String,
        /// Total boosted value deposited in the vault, USD
        #[arg(long)]
        tvl_usd: f64,
    },
    /// Resolved config of a staking pool
    Config { namespace: StakingNamespace },
    /// Balances and pending withdrawal of an account
    Account {
        namespace: StakingNamespace,
        address: String,
    },
    /// Active reward slots and the staking APR
    Apy { namespace: StakingNamespace },
    /// LP pool TVL
    Tvl { namespace: StakingNamespace },
    /// Total and circulating supply
    Supply { token: SupplyToken },
    /// Serve the supply endpoints over HTTP
    Serve,
    /// Poll an account on a fixed interval and print every update
    Watch {
        namespace: StakingNamespace,
        address: String,
    },
    /// Write the effective settings to a TOML file
    SaveConfig { path: PathBuf },
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🪁 KITE STAKING - Rewards, Boost & Supply").cyan().bold()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn section(title: &str) {
    println!();
    println!("{}", style(format!("═══ {} ═══", title)).blue().bold());
    println!();
}

async fn load_state(path: Option<&Path>) -> Result<AppState> {
    let config = AppConfig::load(path)?;
    let state = AppState::from_config(config).map_err(|e| {
        error!("Configuration failed: {}", e);
        error!("Please check your .env file");
        e
    })?;
    state.verify_chain().await?;
    Ok(state)
}

/// Render a failed read next to its fallback value
fn report<T>(state: &QueryState<T>) -> Option<&T> {
    if let Some(error) = state.error() {
        println!("{} Read failed, showing last known value: {}", style("⚠").yellow(), error);
    }
    state.value()
}

/// Newest history rows shown by `account`
const HISTORY_ROWS: usize = 10;

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

fn print_account(account: &AccountState, decimals: u8, cooldown_secs: u64) {
    println!("  Staked:          {}", account.staked_balance.to_decimal_string(decimals));
    println!(
        "  Receipt tokens:  {}",
        account.staking_token_balance.to_decimal_string(decimals)
    );
    match &account.pending_withdrawal {
        Some(pending) => {
            println!("  Pending:         {} ({:?})", pending.amount, pending.status);
            let remaining = account.cooldown_remaining(cooldown_secs, now_secs());
            if remaining == 0 {
                println!("  Cooldown:        {}", style("claimable").green());
            } else {
                println!(
                    "  Cooldown:        {}d {}h remaining",
                    remaining / 86_400,
                    (remaining % 86_400) / 3_600
                );
            }
        }
        None => println!("  Pending:         none"),
    }
}

async fn cmd_apr(path: Option<&Path>, symbol: &str, tvl_usd: f64) -> Result<()> {
    let config = AppConfig::load(path)?;
    let oracle = PriceOracle::from_config(&config)?;

    section(&format!("VAULT APR: {}", symbol.to_uppercase()));

    let schedule = get_vault_schedule(symbol);
    if schedule.is_empty() {
        println!("{}", style("No rewards scheduled for this vault.").yellow());
        return Ok(());
    }

    let symbols: Vec<&str> = schedule.iter().map(|e| e.token.as_str()).collect();
    let prices = oracle.get_prices(&symbols).await;
    let priced = price_schedule(&schedule, &prices);

    for entry in &schedule {
        let price = prices.get(&entry.token.to_uppercase()).copied().unwrap_or(UsdValue::ZERO);
        println!(
            "  {:<6} {} / day  @ {}  ≈ {}",
            entry.token,
            entry.daily_amount,
            price,
            entry.daily_amount.to_usd(price)
        );
    }

    let apr = compute_vault_apr(&VaultAprInput {
        schedule: priced,
        total_boosted_value_usd: UsdValue(tvl_usd),
    });
    println!();
    println!("{} APR: {}", style("✓").green(), style(apr).green().bold());
    Ok(())
}

fn cmd_config(namespace: StakingNamespace) -> Result<()> {
    let registry = StakingRegistry::from_env();
    let config = registry.get_config(namespace)?;

    section(&format!("POOL CONFIG: {}", namespace));
    println!("  Name:            {}", config.display_name);
    println!("  Staked token:    {}", config.staked_token);
    println!("  Staking token:   {}", config.staking_token);
    println!("  Manager:         {}", config.staking_manager);
    println!("  Decimals:        {}", config.decimals);
    println!("  Cooldown:        {} days", config.cooldown_secs / 86_400);
    println!("  Boost eligible:  {}", config.boost_eligible);
    println!("  Reward slots:    {}", config.reward_module.reward_slots);
    println!("  Subgraph user:   {}", config.subgraph.user_entity);
    println!("  Subgraph stats:  {}", config.subgraph.statistic_entity);
    match &config.tvl {
        Some(tvl) => println!("  TVL source:      {} ({})", tvl.source, tvl.pool_address),
        None => println!("  TVL source:      none"),
    }
    Ok(())
}

async fn cmd_account(state: &AppState, namespace: StakingNamespace, address: &str) -> Result<()> {
    let config = state.registry.get_config(namespace)?;
    section(&format!("ACCOUNT: {} in {}", address, namespace));

    let (account, cooldown, history) = futures::join!(
        state.staking.account_state(namespace, address),
        state.staking.cooldown_secs(namespace),
        state.staking.position_history(namespace, address),
    );
    let (account, cooldown, history) = (account?, cooldown?, history?);

    if let Some(account) = report(&account) {
        print_account(account, config.decimals, cooldown);
    }

    section("HISTORY");
    match report(&history) {
        Some(positions) if !positions.is_empty() => {
            for position in positions.iter().take(HISTORY_ROWS) {
                let when = chrono::DateTime::from_timestamp(position.timestamp as i64, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| position.timestamp.to_string());
                println!(
                    "  {}  {:<20} {}",
                    style(when).dim(),
                    format!("{:?}", position.kind),
                    position.amount.to_decimal_string(config.decimals)
                );
            }
        }
        _ => println!("  none"),
    }
    Ok(())
}

/// Reward token address -> symbol, including tokens whose address is
/// deployment-specific
fn reward_symbols(state: &AppState) -> Result<HashMap<Address, &'static str>> {
    let mut symbols = tokens::build_symbol_map();
    symbols.insert(state.registry.get_config(StakingNamespace::Kite)?.staked_token, KITE);
    if let Some(hai) = state.config.hai_token_address.as_deref() {
        if let Ok(hai) = hai.parse::<Address>() {
            symbols.insert(hai, HAI);
        }
    }
    Ok(symbols)
}

async fn cmd_apy(state: &AppState, namespace: StakingNamespace) -> Result<()> {
    let config = state.registry.get_config(namespace)?;
    section(&format!("STAKING APY: {}", namespace));

    let (slots, pool) = futures::join!(
        state.staking.staking_apy(namespace),
        state.staking.pool_stats(namespace),
    );
    let (slots, pool) = (slots?, pool?);

    let entries = report(&slots).cloned().unwrap_or_default();
    if entries.is_empty() {
        println!("{}", style("No active reward slots.").yellow());
        return Ok(());
    }

    let symbols = reward_symbols(state)?;
    let mut wanted: Vec<&str> = entries
        .iter()
        .filter_map(|e| symbols.get(&e.reward_token).copied())
        .collect();
    wanted.push(KITE);
    let prices = state.prices.get_prices(&wanted).await;

    let token_prices: HashMap<Address, UsdValue> = entries
        .iter()
        .filter_map(|e| {
            let symbol = symbols.get(&e.reward_token)?;
            Some((e.reward_token, *prices.get(*symbol)?))
        })
        .collect();

    for entry in &entries {
        let symbol = symbols.get(&entry.reward_token).copied().unwrap_or("?");
        println!(
            "  Slot {}  {:<5} {} wei/s  {} left  (pool {})",
            entry.index,
            symbol,
            entry.rate,
            entry.remaining.to_decimal_string(18),
            entry.reward_pool
        );
    }

    // Single-asset pools are valued at the KITE price; LP pools use TVL
    let staked_usd = match state.staking.tvl(namespace)? {
        Some(tvl) => tvl.usd,
        None => {
            let total = report(&pool).map(|p| p.total_staked).unwrap_or(Wei::ZERO);
            let kite_price = prices.get(KITE).copied().unwrap_or(UsdValue::ZERO);
            total.to_token_amount(config.decimals).to_usd(kite_price)
        }
    };

    let apr = annualized_staking_apr(&entries, 18, &token_prices, staked_usd);
    println!();
    println!("  Staked value:  {}", staked_usd);
    println!("{} APR: {}", style("✓").green(), style(apr).green().bold());
    Ok(())
}

fn cmd_tvl(namespace: StakingNamespace) -> Result<()> {
    let registry = StakingRegistry::from_env();
    let config = registry.get_config(namespace)?;
    let estimator = kite_staking::tvl::LpTvlEstimator::new();

    section(&format!("TVL: {}", namespace));
    match estimator.get_tvl(config) {
        Some(tvl) => println!("{} {}", style("✓").green(), tvl.usd),
        None => println!("{}", style("No TVL for this pool (no secondary market).").yellow()),
    }
    Ok(())
}

async fn cmd_supply(state: &AppState, token: SupplyToken) -> Result<()> {
    let ctx = state.supply_context();
    let config = ctx
        .configs
        .get(&token)
        .ok_or_else(|| eyre!("{} supply is not configured", token))?;

    section(&format!("SUPPLY: {}", token.as_str().to_uppercase()));
    let supply = compute_supply(state.chain.as_ref(), config).await?;

    println!("  Total:         {}", supply.total.to_decimal_string(config.decimals));
    println!("  Excluded:      {}", supply.excluded.to_decimal_string(config.decimals));
    println!("  Vesting:       {}", supply.vesting.to_decimal_string(config.decimals));
    println!(
        "{} Circulating:   {}",
        style("✓").green(),
        supply.circulating.to_decimal_string(config.decimals)
    );
    Ok(())
}

async fn cmd_watch(state: &AppState, namespace: StakingNamespace, address: String) -> Result<()> {
    let config = state.registry.get_config(namespace)?.clone();
    let cooldown = state.staking.cooldown_secs(namespace).await?;
    let interval = Duration::from_secs(state.config.poll_interval_secs);

    section(&format!("WATCH: {} in {} (every {:?})", address, namespace, interval));
    let (mut rx, handle) = state
        .staking
        .spawn_account_poller(namespace, address, interval)?;

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let update = rx.borrow_and_update().clone();
                println!(
                    "{} {}",
                    style(chrono::Local::now().format("%H:%M:%S")).dim(),
                    if update.is_failed() { style("update (failed)").yellow() } else { style("update").green() }
                );
                if let Some(account) = report(&update) {
                    print_account(account, config.decimals, cooldown);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping watcher");
                break;
            }
        }
    }

    handle.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kite_staking=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    print_banner();
    let path = cli.config.as_deref();

    match cli.command {
        Command::Apr { symbol, tvl_usd } => cmd_apr(path, &symbol, tvl_usd).await?,
        Command::Config { namespace } => cmd_config(namespace)?,
        Command::Tvl { namespace } => cmd_tvl(namespace)?,
        Command::Account { namespace, address } => {
            let state = load_state(path).await?;
            cmd_account(&state, namespace, &address).await?;
        }
        Command::Apy { namespace } => {
            let state = load_state(path).await?;
            cmd_apy(&state, namespace).await?;
        }
        Command::Supply { token } => {
            let state = load_state(path).await?;
            cmd_supply(&state, token).await?;
        }
        Command::Serve => {
            let state = load_state(path).await?;
            state.config.print_summary();
            let ctx = Arc::new(state.supply_context());
            server::serve(&state.config.supply_listen_addr, ctx).await?;
        }
        Command::Watch { namespace, address } => {
            let state = load_state(path).await?;
            cmd_watch(&state, namespace, address).await?;
        }
        Command::SaveConfig { path: target } => {
            let config = AppConfig::load(path)?;
            config.save_to_file(&target)?;
            println!("{} Settings written to {}", style("✓").green(), target.display());
        }
    }

    Ok(())
}
