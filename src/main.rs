//! PADDOCK: horse race simulation with a pari-mutuel odds market.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! generates the herd, and runs the engine and market drivers until
//! Ctrl+C. Nothing is persisted.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use paddock::app::Paddock;
use paddock::clock::{Clock, SystemClock};
use paddock::config::AppConfig;
use paddock::population::Herd;

const BANNER: &str = r#"
 ____   _    ____  ____   ___   ____ _  __
|  _ \ / \  |  _ \|  _ \ / _ \ / ___| |/ /
| |_) / _ \ | | | | | | | | | | |   | ' /
|  __/ ___ \| |_| | |_| | |_| | |___| . \
|_| /_/   \_\____/|____/ \___/ \____|_|\_\

  Tick-driven racing with a pari-mutuel book
  v0.1.0
"#;

const CONFIG_PATH: &str = "paddock.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cfg = AppConfig::load_or_default(CONFIG_PATH)?;

    println!("{BANNER}");
    info!(
        tick_hz = cfg.simulation.tick_hz,
        voting_secs = cfg.simulation.voting_secs,
        herd_size = cfg.population.size,
        seed = ?cfg.simulation.seed,
        "PADDOCK starting up"
    );

    // -- Initialise components -------------------------------------------

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let herd = Arc::new(Herd::generate(cfg.herd(), clock.clone()));
    for (class, count) in herd.class_census() {
        info!(class = %class, horses = count, "Herd census");
    }

    let paddock = Arc::new(Paddock::new(&cfg, herd, clock));
    paddock.start();

    // -- Drivers -----------------------------------------------------------

    let mut drivers = paddock.spawn_drivers();
    if cfg.status.report_interval_secs > 0 {
        let reporter = paddock.clone();
        let json = json_logging();
        drivers.spawn(
            "status",
            Duration::from_secs(cfg.status.report_interval_secs),
            move || {
                let status = reporter.status();
                if !json {
                    info!(status = %status, "Status");
                    return;
                }
                match status.to_json() {
                    Ok(line) => info!(status = %line, "Status"),
                    Err(e) => warn!(error = %e, "Status report not serialisable"),
                }
            },
        );
    }

    info!("Racing. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    let counts = drivers.stop().await?;

    // -- Final report ------------------------------------------------------

    for settlement in paddock.market().settlements().iter().rev() {
        info!(settlement = %settlement, "Settled race");
    }
    let summary = paddock.wallet().summary();
    info!(
        balance = format!("${:.2}", summary.balance),
        tickets = summary.tickets,
        open_tickets = summary.open_tickets,
        net = format!("${:.2}", summary.net()),
        drivers = ?counts,
        "PADDOCK shut down cleanly."
    );

    Ok(())
}

fn json_logging() -> bool {
    std::env::var("PADDOCK_LOG_JSON").is_ok()
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paddock=info"));

    if json_logging() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
