use anyhow::Context;
use autotrader::api::{DexScreenerClient, JupiterClient, SolanaWallet};
use autotrader::config::{PriceSourceKind, Settings};
use autotrader::db::{MemoryStore, OrderStore, PostgresPersistence, ProfileStore};
use autotrader::execution::{AutoBuyOutcome, AutoBuyer, CycleReport, OrderManager, OrderRequest};
use autotrader::{
    Currency, OrderStatus, Platform, PriceSource, ProfileManager, SellMode, SwapExecutor,
    WalletProvider,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use uuid::Uuid;

/// Automated exit engine for Solana token positions
#[derive(Parser)]
#[command(name = "autotrader", about = "Track Solana token orders and sell on stop-loss or timer")]
struct Cli {
    /// Config file stem (without extension)
    #[arg(long, default_value = "autotrader")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate orders on a fixed interval until Ctrl+C
    Run,
    /// Run a single evaluation cycle and exit
    Cycle,
    /// Manage tracked orders
    #[command(subcommand)]
    Orders(OrdersCommand),
    /// Wallet balance of a token not yet committed to orders
    Balance { mint_address: String },
    /// Manage buy/sell profiles
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Buy a token with a profile's policy and start tracking it
    AutoBuy {
        mint_address: String,
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "twitter")]
        platform: Platform,
    },
    /// Ask the aggregator for a quote without trading
    Quote {
        input_mint: String,
        output_mint: String,
        /// Amount in raw units (lamports for SOL)
        amount: u64,
        #[arg(long, default_value_t = 50)]
        slippage_bps: u16,
    },
}

#[derive(Subcommand)]
enum OrdersCommand {
    List {
        #[arg(long, default_value = "ACTIVE")]
        status: OrderStatus,
    },
    Add {
        mint_address: String,
        #[arg(long)]
        sell_mode: SellMode,
        /// Minutes for time_based, drawdown percent for stop_loss
        #[arg(long)]
        sell_value: f64,
        #[arg(long, default_value = "USDC")]
        sell_type: Currency,
        #[arg(long)]
        balance: f64,
        #[arg(long, default_value_t = 100)]
        slippage: u16,
    },
    Cancel { id: Uuid },
}

#[derive(Subcommand)]
enum ProfileCommand {
    Add {
        username: String,
        #[arg(long, default_value = "twitter")]
        platform: Platform,
    },
    Activate { id: Uuid },
    Deactivate { id: Uuid },
    List,
    Delete { id: Uuid },
}

struct Engine {
    orders: OrderManager,
    profiles: ProfileManager,
    auto_buyer: AutoBuyer,
    jupiter: Arc<JupiterClient>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config).context("Failed to load settings")?;
    let engine = build_engine(&settings).await?;

    match cli.command {
        Command::Run => {
            engine.orders.recover_processing().await?;
            run_loop(&engine, &settings).await
        }
        Command::Cycle => {
            engine.orders.recover_processing().await?;
            let report = engine.orders.run_cycle().await?;
            print_report(&report);
        }
        Command::Orders(cmd) => orders_command(&engine, cmd).await?,
        Command::Balance { mint_address } => {
            let remaining = engine
                .orders
                .remaining_trackable_balance(&mint_address)
                .await?;
            println!("{} trackable: {}", mint_address, remaining);
        }
        Command::Profile(cmd) => profile_command(&engine, cmd).await?,
        Command::AutoBuy {
            mint_address,
            username,
            platform,
        } => match engine
            .auto_buyer
            .auto_buy(&mint_address, platform, &username)
            .await?
        {
            AutoBuyOutcome::Created { order_id, balance } => {
                println!("Created order {} tracking {}", order_id, balance)
            }
            AutoBuyOutcome::Skipped => println!("Profile {} is inactive, nothing bought", username),
        },
        Command::Quote {
            input_mint,
            output_mint,
            amount,
            slippage_bps,
        } => {
            let quote = engine
                .jupiter
                .get_quote(&input_mint, &output_mint, amount, slippage_bps)
                .await?;
            println!(
                "{} -> {} (impact {:.4}%, {} route steps)",
                quote.in_amount, quote.out_amount, quote.price_impact_pct, quote.route_count
            );
        }
    }

    Ok(())
}

// ============================================================================
// Initialization
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autotrader=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn build_engine(settings: &Settings) -> anyhow::Result<Engine> {
    let (order_store, profile_store): (Arc<dyn OrderStore>, Arc<dyn ProfileStore>) =
        match &settings.database_url {
            Some(url) => {
                let postgres = Arc::new(
                    PostgresPersistence::new(url)
                        .await
                        .context("Failed to connect to Postgres")?,
                );
                (postgres.clone() as Arc<dyn OrderStore>, postgres as Arc<dyn ProfileStore>)
            }
            None => {
                tracing::warn!("⚠️  No database_url configured, orders live in memory only");
                let memory = Arc::new(MemoryStore::new());
                (memory.clone() as Arc<dyn OrderStore>, memory as Arc<dyn ProfileStore>)
            }
        };

    let public_key = settings
        .solana
        .wallet_public_key
        .as_deref()
        .context("solana.wallet_public_key is not configured")?;
    let signer_url = settings
        .solana
        .signer_url
        .as_deref()
        .context("solana.signer_url is not configured")?;

    let wallet: Arc<dyn WalletProvider> = Arc::new(SolanaWallet::new(
        &settings.solana.rpc_url,
        signer_url,
        public_key,
        settings.retry.clone(),
    ));
    let jupiter = Arc::new(JupiterClient::new(
        &settings.jupiter,
        wallet.clone(),
        settings.retry.clone(),
    ));

    let prices: Arc<dyn PriceSource> = match settings.price_source {
        PriceSourceKind::Jupiter => jupiter.clone(),
        PriceSourceKind::DexScreener => Arc::new(DexScreenerClient::new(
            &settings.dexscreener.api_url,
            settings.retry.clone(),
        )),
    };
    let swapper: Arc<dyn SwapExecutor> = jupiter.clone();

    tracing::info!(
        "Wallet {} | prices via {:?} | {} samples every {}ms",
        public_key,
        settings.price_source,
        settings.monitor.samples,
        settings.monitor.interval_ms
    );

    Ok(Engine {
        orders: OrderManager::new(
            order_store.clone(),
            prices.clone(),
            swapper.clone(),
            wallet.clone(),
            settings.monitor.clone(),
        ),
        profiles: ProfileManager::new(profile_store.clone(), settings.defaults.clone()),
        auto_buyer: AutoBuyer::new(order_store, profile_store, prices, swapper, wallet),
        jupiter,
    })
}

// ============================================================================
// Commands
// ============================================================================

async fn run_loop(engine: &Engine, settings: &Settings) {
    let period = Duration::from_secs(settings.cycle.interval_secs.max(1));
    let mut ticker = interval_at(Instant::now(), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Ctrl+C only flips this flag; a cycle in progress always runs to the end
    let (shutdown_tx, mut shutdown) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("⚠️  Received Ctrl+C, finishing current cycle..."),
            Err(e) => tracing::error!("❌ Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    tracing::info!("🚀 Order loop started, every {}s", period.as_secs());
    tracing::info!("Press Ctrl+C to stop...");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                match engine.orders.run_cycle().await {
                    Ok(report) if !report.is_clean() => {
                        tracing::warn!("{} order(s) failed this cycle", report.failures.len());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("❌ Cycle failed: {}", e),
                }
            }
        }
    }

    tracing::info!("👋 Order loop stopped");
}

async fn orders_command(engine: &Engine, cmd: OrdersCommand) -> anyhow::Result<()> {
    match cmd {
        OrdersCommand::List { status } => {
            let orders = engine.orders.get_orders(status).await?;
            if orders.is_empty() {
                println!("No {} orders", status);
            }
            for o in orders {
                println!(
                    "{}  {}  bal={}  entry=${:.8}  max=${:.8}  {} {} -> {}  added {}{}",
                    o.id,
                    o.mint_address,
                    o.balance,
                    o.entry_value,
                    o.last_price_max,
                    o.sell_mode,
                    o.sell_value,
                    o.sell_type,
                    o.time_added.format("%Y-%m-%d %H:%M:%S"),
                    o.profit
                        .map(|p| format!("  profit=${:.2}", p))
                        .unwrap_or_default()
                );
            }
        }
        OrdersCommand::Add {
            mint_address,
            sell_mode,
            sell_value,
            sell_type,
            balance,
            slippage,
        } => {
            let id = engine
                .orders
                .add_order(OrderRequest {
                    mint_address,
                    sell_mode,
                    sell_value,
                    sell_type,
                    balance,
                    slippage,
                })
                .await?;
            println!("Created order {}", id);
        }
        OrdersCommand::Cancel { id } => {
            engine.orders.cancel_order(id).await?;
            println!("Canceled order {}", id);
        }
    }
    Ok(())
}

async fn profile_command(engine: &Engine, cmd: ProfileCommand) -> anyhow::Result<()> {
    match cmd {
        ProfileCommand::Add { username, platform } => {
            let id = engine.profiles.add_profile(platform, &username).await?;
            println!("Profile {} for {} ({})", id, username, platform);
        }
        ProfileCommand::Activate { id } => engine.profiles.activate_profile(id).await?,
        ProfileCommand::Deactivate { id } => engine.profiles.deactivate_profile(id).await?,
        ProfileCommand::List => {
            for p in engine.profiles.get_profiles().await? {
                println!(
                    "{}  {}/{}  {}  buy {} {} {}  sell {} {} -> {}",
                    p.id,
                    p.platform,
                    p.username,
                    if p.is_active { "active" } else { "inactive" },
                    p.buy.amount,
                    p.buy.amount_type.as_str(),
                    p.buy.buy_type,
                    p.sell.sell_mode,
                    p.sell.sell_value,
                    p.sell.sell_type
                );
            }
        }
        ProfileCommand::Delete { id } => engine.profiles.delete_profile(id).await?,
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!(
        "evaluated={} ratcheted={} triggered={} sold={} revoked={} failed={}",
        report.evaluated,
        report.ratcheted,
        report.triggered,
        report.sold.len(),
        report.revoked.len(),
        report.failures.len()
    );
    for failure in &report.failures {
        println!(
            "  {} {}: {}",
            failure
                .order_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            failure.mint_address,
            failure.error
        );
    }
}
