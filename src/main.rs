//! DLT Tracker entry point.
//!
//! Loads configuration, initialises structured logging, installs the
//! cached (or seed) history, then keeps it in sync with the remote
//! sources on an interval while serving the dashboard API.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use dlt_tracker::advisor::openrouter::OpenRouterAdvisor;
use dlt_tracker::advisor::Advisor;
use dlt_tracker::config;
use dlt_tracker::dashboard::{self, DashboardState};
use dlt_tracker::engine::{HistoryStore, StageResult, SyncOrchestrator, SyncOutcome, SyncReport};

const BANNER: &str = r#"
 ____  _   _____   _____                _
|  _ \| | |_   _| |_   _| __ __ _  ___| | _____ _ __
| | | | |   | |     | || '__/ _` |/ __| |/ / _ \ '__|
| |_| | |___| |     | || | | (_| | (__|   <  __/ |
|____/|_____|_|     |_||_|  \__,_|\___|_|\_\___|_|

  Draw history sync and prize backtesting
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        name = %cfg.app.name,
        resync_interval_secs = cfg.app.resync_interval_secs,
        history_path = %cfg.storage.history_path,
        "DLT Tracker starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = Arc::new(HistoryStore::new(&cfg.storage.history_path));
    let orchestrator = Arc::new(SyncOrchestrator::from_config(&cfg, store.clone())?);

    let stage = orchestrator.bootstrap().await;
    info!(stage = %stage.stage, result = ?stage.result, draws = store.snapshot().len(), "History bootstrapped");

    let advisor: Option<Arc<dyn Advisor>> = if cfg.advisor.enabled {
        match OpenRouterAdvisor::from_config(&cfg.advisor) {
            Ok(a) => {
                info!(model = %cfg.advisor.model, fallback = ?cfg.advisor.fallback_model, "Advisor enabled");
                Some(Arc::new(a))
            }
            Err(e) => {
                warn!(error = %e, "Advisor enabled but could not be initialised, continuing without it");
                None
            }
        }
    } else {
        None
    };

    // Log every published history change.
    let mut history_rx = store.subscribe();
    tokio::spawn(async move {
        while history_rx.changed().await.is_ok() {
            let snapshot = history_rx.borrow_and_update().clone();
            info!(
                version = snapshot.version,
                draws = snapshot.len(),
                latest = snapshot.latest().map(|d| d.id().to_string()).unwrap_or_default(),
                "History updated"
            );
        }
    });

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(
            Arc::new(DashboardState::new(orchestrator.clone(), advisor)),
            cfg.dashboard.port,
        );
    }

    // -- Main loop -------------------------------------------------------

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    if cfg.app.resync_interval_secs == 0 {
        info!("Periodic resync disabled; running one sync. Press Ctrl+C to stop.");
        tokio::select! {
            report = orchestrator.sync() => log_sync_report(&report),
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                return Ok(());
            }
        }
        // Keep serving the dashboard until shutdown.
        let _ = (&mut shutdown).await;
        info!("Shutdown signal received.");
    } else {
        let mut interval = tokio::time::interval(Duration::from_secs(cfg.app.resync_interval_secs));
        info!(interval_secs = cfg.app.resync_interval_secs, "Entering sync loop. Press Ctrl+C to stop.");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = orchestrator.sync().await;
                    log_sync_report(&report);
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }
    }

    let snapshot = store.snapshot();
    info!(version = snapshot.version, draws = snapshot.len(), "DLT Tracker shut down cleanly.");
    Ok(())
}

fn log_sync_report(report: &SyncReport) {
    for stage in &report.stages {
        match &stage.result {
            StageResult::Failed { error } => warn!(stage = %stage.stage, error = %error, "Stage failed"),
            other => info!(stage = %stage.stage, result = ?other, "Stage complete"),
        }
    }
    if report.outcome == SyncOutcome::Failed {
        warn!(
            run_id = %report.run_id,
            draws = report.total_draws,
            "All remote sources failed; serving the previous history"
        );
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dlt_tracker=info"));

    let json_logging = std::env::var("DLT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
