//! Driver binary: loads `Config`, builds a `GridBot` against a
//! `PaperExchangeAdapter`, and runs the check-interval sync loop until
//! either the reset interval elapses or the process receives ctrl-c.
//!
//! Grounded on the teacher's `main.rs` for its overall shape (CLI args via
//! `clap`, a `SessionMetrics`-style counter struct, a `tokio::spawn`
//! ctrl-c watcher flipping an `Arc<AtomicBool>`, a final summary on exit)
//! with the trading logic itself delegated entirely to `GridBot` —
//! `main.rs` never touches grid math directly.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use gridzbot::paper_adapter::PaperExchangeAdapter;
use gridzbot::prelude::*;
use gridzbot::WebhookNotifier;
use log::{error, info, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::{sleep, Duration};

#[derive(Parser, Debug)]
#[clap(name = "gridzbot")]
#[clap(about = "Grid trading engine", long_about = None)]
struct Args {
    /// Optional TOML configuration file, layered over the built-in
    /// defaults and under `GRIDBOT_`-prefixed environment variables.
    #[clap(short, long)]
    config: Option<PathBuf>,

    #[clap(long)]
    pair: Option<String>,

    #[clap(long)]
    check_interval_secs: Option<u64>,

    #[clap(long)]
    order_limit: Option<u32>,

    #[clap(long)]
    grid_num: Option<u32>,

    #[clap(long)]
    debug: bool,
}

/// Running counters over the life of the process, surfaced in the
/// shutdown summary. Distinct from `OrderCounter`, which `GridBot` keeps
/// per grid run and resets on every restart.
#[derive(Default)]
struct SessionMetrics {
    sync_cycles: u64,
    sync_errors: u64,
    restarts: u32,
}

impl SessionMetrics {
    fn display_summary(&self, elapsed: Instant) {
        info!("session summary:");
        info!("  runtime:      {:.1}s", elapsed.elapsed().as_secs_f64());
        info!("  sync cycles:  {}", self.sync_cycles);
        info!("  sync errors:  {}", self.sync_errors);
        info!("  grid restarts: {}", self.restarts);
    }
}

fn setup_logging(debug: bool) {
    let level = if debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

fn load_configuration(args: &Args) -> Result<Config> {
    let mut loader = ConfigLoader::new().context("building default configuration layer")?;
    if let Some(path) = &args.config {
        loader = loader.with_file(path)?;
    }
    loader = loader.with_env()?;
    let overrides = CliOverrides {
        pair: args.pair.clone(),
        check_interval_secs: args.check_interval_secs,
        order_limit: args.order_limit,
        grid_num: args.grid_num,
        log_level: None,
    };
    loader = loader.with_cli_overrides(&overrides)?;
    loader.build()
}

/// Build a fresh `Parameter` against the adapter's live price and use it
/// to start a new `GridBot`. Called once at startup and again every time
/// the reset interval rolls over, so the grid always re-centres on a
/// current price snapshot rather than a stale configured one
/// (SPEC_FULL.md §6.4).
async fn start_new_bot(
    config: &Config,
    precision: Precision,
    adapter: Arc<dyn ExchangeAdapter>,
    deps: GridBotDeps,
) -> Result<GridBot> {
    let ticker = adapter
        .get_latest_prices()
        .await
        .map_err(|e| anyhow::anyhow!("fetching initial price snapshot: {e}"))?;

    let parameter = Parameter::by_interval(
        config.pair.clone(),
        config.init_base,
        config.init_quote,
        ticker.last,
        config.price_interval,
        config.grid_num,
        config.fee,
        &precision,
    )
    .map_err(|e| anyhow::anyhow!("grid parameters are infeasible: {e}"))?;

    let mut bot = GridBot::new(
        parameter,
        precision,
        config.balance_threshold,
        config.enable_irregular_price_check,
        adapter,
        deps,
        config.report_interval_secs,
    );
    bot.init_and_start().await?;
    Ok(bot)
}

async fn run(config: Config, adapter: Arc<dyn ExchangeAdapter>, notifier: Arc<dyn Notifier>) -> Result<()> {
    let precision = Precision::new(config.price_precision, config.amount_precision);
    let deps = GridBotDeps {
        notifier: notifier.clone(),
        store: None,
        pair: config.pair.clone(),
    };

    let mut bot = start_new_bot(&config, precision, adapter.clone(), deps.clone()).await?;
    let mut metrics = SessionMetrics::default();
    let session_start = Instant::now();
    let mut bot_started_at = Instant::now();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("ctrl-c received, shutting down after the current cycle");
                shutdown_clone.store(true, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for shutdown signal: {e}"),
        }
    });

    let check_interval = Duration::from_secs(config.check_interval_secs);
    let reset_interval = Duration::from_secs(config.reset_interval_secs);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("stopping bot {} on shutdown request", bot.id());
            bot.cancel_and_stop().await?;
            break;
        }

        if bot_started_at.elapsed() >= reset_interval {
            info!("reset interval elapsed, restarting bot {} on a fresh price snapshot", bot.id());
            bot.cancel_and_stop().await?;
            bot = start_new_bot(&config, precision, adapter.clone(), deps.clone()).await?;
            bot_started_at = Instant::now();
            metrics.restarts += 1;
        }

        sleep(check_interval).await;

        match bot.sync_and_adjust().await {
            Ok(()) => metrics.sync_cycles += 1,
            Err(e) => {
                metrics.sync_errors += 1;
                error!("sync_and_adjust failed: {e}");
            }
        }
    }

    metrics.display_summary(session_start);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.debug);

    let config = load_configuration(&args)?;
    info!("starting gridzbot on {} (grid_num={})", config.pair, config.grid_num);

    let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(
        config.info_webhook_url.clone(),
        config.error_webhook_url.clone(),
    ));

    // No live venue credentials are wired up here; the paper adapter
    // fills orders against a synthetic price path so the driver has
    // something to run against out of the box. Swap in a real
    // `ExchangeAdapter` impl to trade against a venue. The seed price is
    // the paper market's own starting point, not a grid `init_price` —
    // per SPEC_FULL.md §6.4 the grid itself is always sized off a fresh
    // snapshot fetched from the adapter at `start_new_bot` time.
    let paper_seed_price = config.price_interval * Decimal::from(10 * config.grid_num);
    let adapter: Arc<dyn ExchangeAdapter> = Arc::new(PaperExchangeAdapter::new(
        config.pair.clone(),
        config.fee,
        config.order_limit,
        paper_seed_price,
        paper_seed_price * dec!(0.05),
        3600.0,
    ));

    run(config, adapter, notifier).await
}
