use rangekeeper::connector::{OrcaMarketData, PaperWallet};
use rangekeeper::engine::{StrategyEngine, StrategySettings};
use rangekeeper::{api, config::Config, db::init_db, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    let ledger = Arc::new(Repository::new(pool));

    // Live market data, paper execution. Swaps, balances, and position
    // lifecycle all go through the paper wallet until real signing is
    // wired in.
    let market = Arc::new(OrcaMarketData::new(
        config.pools_url.clone(),
        config.prices_url.clone(),
    ));
    let base_raw = config.paper_base_balance.to_raw_amount(6);
    let wallet = Arc::new(
        PaperWallet::new(market.clone()).with_balance(config.base_asset.clone(), base_raw, 6),
    );

    let settings = StrategySettings {
        stop_loss_trailing_percent: config.stop_loss_trailing_percent,
        simultaneous_entries: config.simultaneous_entries,
        usd_entry_value: config.usd_entry_value,
        base_asset: config.base_asset.clone(),
        native_mint: config.native_mint.clone(),
        min_native_usd: config.min_native_usd,
        hold_tokens: config.hold_tokens.clone(),
        settle_delay: Duration::from_millis(config.settle_delay_ms),
    };

    let engine = Arc::new(StrategyEngine::new(
        market,
        wallet.clone(),
        wallet.clone(),
        wallet.clone(),
        wallet,
        ledger,
        settings,
    ));

    // Scheduled cycles; a missed tick just runs on the next one.
    let scheduled_engine = engine.clone();
    let cycle_interval = Duration::from_secs(config.cycle_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cycle_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let report = scheduled_engine.run_cycle().await;
            tracing::info!("{}", report);
        }
    });

    // Create router
    let app = api::create_router(api::AppState { engine });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
