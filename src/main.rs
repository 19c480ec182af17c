//! STEAMER: racing market intelligence pipeline
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores snapshots and baselines from disk, and runs the adaptive
//! refresh loop until Ctrl+C, saving state after every pass.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use steamer::acquisition::fetcher::Fetcher;
use steamer::acquisition::http::HttpLauncher;
use steamer::config;
use steamer::data::embedded::EmbeddedJsonExtractor;
use steamer::engine::pipeline::Pipeline;
use steamer::engine::scheduler::{PassOutcome, Scheduler};
use steamer::engine::tracker::Tracker;
use steamer::storage::{self, MemoryStore, PersistedState, SnapshotStore};
use steamer::strategy::ScoringEngine;

const BANNER: &str = r#"
  ____ _____ _____    _    __  __ _____ ____
 / ___|_   _| ____|  / \  |  \/  | ____|  _ \
 \___ \ | | |  _|   / _ \ | |\/| |  _| | |_) |
  ___) || | | |___ / ___ \| |  | | |___|  _ <
 |____/ |_| |_____/_/   \_\_|  |_|_____|_| \_\

  Racing market intelligence: consensus, form, movement
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("STEAMER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        config = %config_path,
        events = cfg.events.len(),
        tick_interval_secs = cfg.agent.tick_interval_secs,
        "STEAMER starting up"
    );

    // -- Restore state ---------------------------------------------------

    let state_file = cfg.agent.state_file.clone();
    let (store, tracker) = match storage::load_state(Some(&state_file))? {
        Some(state) => {
            info!(
                snapshots = state.snapshots.len(),
                baselines = state.tracker.baselines.len(),
                saved_at = %state.saved_at,
                "Resumed from saved state"
            );
            (
                MemoryStore::with_snapshots(state.snapshots),
                Tracker::from_state(state.tracker),
            )
        }
        None => {
            info!("Fresh start");
            (MemoryStore::new(), Tracker::new())
        }
    };
    let store: Arc<dyn SnapshotStore> = Arc::new(store);
    let tracker = Arc::new(tracker);

    // -- Initialise components -------------------------------------------

    let fetch_config = cfg.fetcher.to_fetch_config();
    if !fetch_config.humanize.enabled {
        warn!("Humanization disabled; requests will have a fixed behavioural signature");
    }
    let launcher = Arc::new(HttpLauncher::with_timeout(
        fetch_config.attempt_timeout.saturating_sub(Duration::from_secs(5)).max(Duration::from_secs(5)),
    ));
    let fetcher = Fetcher::new(launcher, fetch_config);

    let extractor = Arc::new(EmbeddedJsonExtractor::new(
        cfg.extractor.price_marker.clone(),
        cfg.extractor.form_marker.clone(),
    ));
    let scoring = ScoringEngine::new(cfg.source_weights(), cfg.scoring.to_elite_config());

    let pipeline = Arc::new(Pipeline::new(fetcher, extractor, scoring, tracker, store));

    let scheduler_config = cfg
        .scheduler
        .to_scheduler_config(Duration::from_secs(cfg.agent.tick_interval_secs));
    let scheduler = Scheduler::new(pipeline, cfg.events.clone(), scheduler_config);

    let now = chrono::Utc::now();
    for event in &cfg.events {
        info!(
            event_id = %event.id,
            event = %event.display_name(),
            rules = %event.rules,
            start = %event.start_time,
            state = ?scheduler.state_of(event, now),
            snapshot = scheduler.pipeline().current(&event.id).is_available(),
            "Tracking event"
        );
    }

    // -- Main loop -------------------------------------------------------

    info!("Entering refresh loop. Press Ctrl+C to stop.");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received.");
    };

    scheduler
        .run(shutdown, |outcome| {
            if let PassOutcome::Completed(report) = outcome {
                for event_id in &report.failed {
                    warn!(event_id = %event_id, "Serving previous snapshot after failed refresh");
                }
            }
            if let Err(e) = storage::save_state(&capture(scheduler.pipeline()), Some(&state_file)) {
                error!(error = %e, "Failed to save state");
            }
        })
        .await;

    // Save final state
    let state = capture(scheduler.pipeline());
    storage::save_state(&state, Some(&state_file)).context("Failed to save final state")?;
    info!(
        snapshots = state.snapshots.len(),
        baselines = state.tracker.baselines.len(),
        "STEAMER shut down cleanly."
    );

    Ok(())
}

/// Snapshots plus tracker baselines, as written to the state file.
fn capture(pipeline: &Pipeline) -> PersistedState {
    PersistedState::capture(pipeline.store().as_ref(), pipeline.tracker().export())
}

/// Initialise the tracing subscriber.
///
/// `RUST_LOG` controls filtering (default `steamer=info`); setting
/// `STEAMER_LOG_JSON` switches to JSON lines.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("steamer=info"));

    let json_logging = std::env::var("STEAMER_LOG_JSON").is_ok();

    if json_logging {
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
