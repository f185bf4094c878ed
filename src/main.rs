//! election-signals: poll-driven fair values for Kalshi election markets.
//!
//! Single-binary Tokio application that, on every tick:
//! 1. Reads the latest generic-ballot poll reading
//! 2. Fetches House, Senate and balance-of-power combo quotes
//! 3. Values each market from the poll margin
//! 4. Classifies the edge and journals the signals

mod config;
mod journal;
mod poll;
mod refresh;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use common::{Error, SignalsConfig};
use kalshi_client::{resolve_rest_base_url, KalshiAuth, KalshiRestClient, RetryPolicy};
use signals::SnapshotStore;

use crate::journal::{resolve_journal_dir, SignalJournal};
use crate::poll::poll_source_from_config;
use crate::refresh::Refresher;

/// Election market signal engine
#[derive(Parser)]
#[command(name = "election-signals", about = "Poll-driven signals for Kalshi election markets")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Just test authentication and print balance, then exit.
    #[arg(long)]
    check_auth: bool,

    /// Run a single refresh tick, print the snapshot as JSON, and exit.
    #[arg(long)]
    once: bool,
}

/// Per-crate filter directives for a single level.
fn default_filter(level: &str) -> String {
    ["election_signals", "kalshi_client", "valuation", "signals"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(level).into()),
        )
        .with_target(true)
        .init();
}

fn build_client(cfg: &SignalsConfig) -> Result<KalshiRestClient, Error> {
    let auth = match cfg.credentials() {
        Some(creds) => Some(KalshiAuth::new(creds.key_id, creds.private_key_pem)?),
        None => {
            info!("No Kalshi credentials configured; public-data-only mode");
            None
        }
    };
    let base_url = resolve_rest_base_url(cfg.use_demo, cfg.api_base_url.as_deref());
    KalshiRestClient::new(auth, base_url, RetryPolicy::from(&cfg.retry))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Config is loaded before logging so its log_level can seed the filter.
    let cfg = config::load_config(&cli.config);
    let level = cfg.as_ref().map(|c| c.log_level.as_str()).unwrap_or("info");
    init_tracing(level);

    let cfg = match cfg {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Election signals starting up...");
    info!("Environment: {}", if cfg.use_demo { "DEMO" } else { "PRODUCTION" });
    info!(
        "Series: house={}{} senate={}{} combos={}",
        cfg.markets.house_series,
        cfg.markets.house_side_suffix,
        cfg.markets.senate_series,
        cfg.markets.senate_side_suffix,
        cfg.markets.combo_series,
    );
    info!(
        "Thresholds: house={}%, senate={}%, combo={}%",
        cfg.strategy.edge_threshold_pct,
        cfg.strategy.senate_edge_threshold_pct,
        cfg.strategy.combo_edge_threshold_pct,
    );

    let client = match build_client(&cfg) {
        Ok(c) => c,
        Err(e) => {
            error!("Kalshi client initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    // ── Check-auth mode ──────────────────────────────────────────────
    if cli.check_auth {
        info!("Running auth check...");
        match client.get_balance().await {
            Ok(balance) => {
                info!(
                    "Auth successful! Balance: {}¢ (${:.2}), portfolio value: ${:.2}",
                    balance.balance_cents,
                    balance.balance_cents as f64 / 100.0,
                    balance.portfolio_value_cents as f64 / 100.0,
                );
            }
            Err(e) => {
                error!("Auth check failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let poll = match poll_source_from_config(&cfg.poll) {
        Ok(p) => p,
        Err(e) => {
            error!("Poll source error: {}", e);
            std::process::exit(1);
        }
    };
    info!("Poll source: {}", poll.describe());

    let store = SnapshotStore::new();
    let mut refresher = match Refresher::new(Arc::new(client), poll, &cfg, store.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!("Signal engine initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    // ── Single-tick mode ─────────────────────────────────────────────
    if cli.once {
        let snapshot = refresher.tick().await;
        match serde_json::to_string_pretty(snapshot.as_ref()) {
            Ok(body) => println!("{body}"),
            Err(e) => {
                error!("Failed to serialize snapshot: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let mut journal = match SignalJournal::open(resolve_journal_dir()) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to initialize signal journal: {}", e);
            std::process::exit(1);
        }
    };
    info!("Signal journal path: {}", journal.dir().display());

    // ── Refresh loop ─────────────────────────────────────────────────
    let mut interval = tokio::time::interval(Duration::from_secs(cfg.timing.refresh_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown_reason = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break "ctrl_c",
            _ = interval.tick() => {
                let snapshot = refresher.tick().await;
                if snapshot.is_degraded() {
                    warn!("Snapshot {} is degraded (stale: {:?})", snapshot.tick, snapshot.stale);
                }
                journal.record(&snapshot);
            }
        }
    };

    info!("Shutdown requested ({})", shutdown_reason);
    if let Some(last) = store.current().await {
        info!("Last snapshot: tick {} at {}", last.tick, last.taken_at);
    }
    info!("Election signals shut down.");
}
