use funding_data::{CycleOutcome, Pipeline, PipelineConfig};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    init_logging();

    let config = PipelineConfig::from_env();
    info!(
        data_dir = %config.data_dir.display(),
        exchanges = ?config.exchange_ids(),
        cycle_interval_secs = config.cycle_interval.as_secs(),
        max_attempts = config.max_attempts,
        "Starting funding-data server"
    );

    let pipeline = match Pipeline::from_config(config) {
        Ok(pipeline) => pipeline,
        Err(error) => {
            error!(%error, "failed to initialise funding pipeline");
            std::process::exit(1);
        }
    };

    // First tick completes immediately so a cycle runs at start-up. Ticks missed while a cycle
    // is running are skipped rather than queued.
    let mut ticker = interval(pipeline.config().cycle_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => run_cycle(&pipeline).await,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }
}

async fn run_cycle(pipeline: &Pipeline) {
    match pipeline.run_cycle().await {
        Ok(CycleOutcome::Written { observations, rows }) => {
            info!(observations, rows, "funding cycle complete");
        }
        Ok(CycleOutcome::NoData) => warn!("funding cycle produced no data"),
        Ok(CycleOutcome::Skipped) => debug!("funding cycle skipped, previous cycle still running"),
        Err(error) => error!(%error, "funding cycle failed, previous tables kept"),
    }
}

/// Initialize logging, emitting JSON when `FUNDING_LOG_JSON` is set.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("FUNDING_LOG_JSON")
        .ok()
        .is_some_and(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "yes"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
