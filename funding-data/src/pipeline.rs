use crate::{
    collector::SnapshotCollector,
    config::PipelineConfig,
    error::PipelineError,
    exchange::{FundingAdapter, build_adapter},
    history::HistoryAggregator,
    merge::merge,
    table::{render_combined, render_matrix, write_atomic},
};
use chrono::Utc;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::Mutex;
use tracing::{Instrument, Span, info, info_span, warn};

/// Result of a [`Pipeline::run_cycle`] invocation.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CycleOutcome {
    /// A previous cycle was still running, so this one did nothing.
    Skipped,
    /// No exchange produced any data. Existing tables were left untouched.
    NoData,
    /// Tables were rewritten.
    Written {
        /// Live observations collected.
        observations: usize,
        /// Rows written to the combined table.
        rows: usize,
    },
}

/// Funding rate aggregation pipeline: collect live snapshots & history from every exchange, merge
/// them and atomically rewrite both funding tables.
pub struct Pipeline {
    config: PipelineConfig,
    adapters: Vec<Arc<dyn FundingAdapter>>,
    collector: SnapshotCollector,
    history: HistoryAggregator,
    busy: Mutex<()>,
    cycles: AtomicU64,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field(
                "adapters",
                &self.adapters.iter().map(|adapter| adapter.exchange()).collect::<Vec<_>>(),
            )
            .field("collector", &self.collector)
            .field("history", &self.history)
            .finish()
    }
}

impl Pipeline {
    /// Construct a [`Pipeline`] over the provided adapters.
    pub fn new(config: PipelineConfig, adapters: Vec<Arc<dyn FundingAdapter>>) -> Self {
        let collector = SnapshotCollector::default()
            .with_max_attempts(config.max_attempts)
            .with_retry_delay(config.retry_delay)
            .with_parallel(config.parallel_exchanges);

        let history = HistoryAggregator::default()
            .with_quotes(config.history_quotes.iter().cloned())
            .with_parallel(config.parallel_exchanges);

        Self {
            config,
            adapters,
            collector,
            history,
            busy: Mutex::new(()),
            cycles: AtomicU64::new(0),
        }
    }

    /// Construct a [`Pipeline`] with a REST adapter for every configured exchange.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let rest = config.rest_config();
        let adapters = config
            .exchanges
            .iter()
            .map(|exchange| build_adapter(exchange, &rest))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(config, adapters))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one collection cycle, returning [`CycleOutcome::Skipped`] if a cycle is already
    /// running.
    ///
    /// Exchange and symbol failures are contained. Only a failure to render or write a table is an
    /// error, in which case the previously written table is left intact.
    ///
    /// Both tables are rendered before anything is written. The combined table is written first
    /// and the plain matrix second, so a failed combined write leaves both files from the previous
    /// cycle in place.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, PipelineError> {
        let Ok(_guard) = self.busy.try_lock() else {
            warn!("previous funding cycle still running, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let span = info_span!("cycle", cycle);
        self.execute(&span).instrument(span.clone()).await
    }

    async fn execute(&self, span: &Span) -> Result<CycleOutcome, PipelineError> {
        let now = Utc::now();
        info!(exchanges = self.adapters.len(), "funding cycle started");

        let live = self.collector.collect(&self.adapters, span).await;
        let history = self.history.aggregate(&self.adapters, now, span).await;

        if live.is_empty() && !history.iter().any(|window| window.has_signal()) {
            warn!("no funding data collected, keeping existing tables");
            return Ok(CycleOutcome::NoData);
        }

        let observations = live.len();
        let matrix = (!live.is_empty())
            .then(|| render_matrix(&self.config.exchange_ids(), &live))
            .transpose()?;

        let records = merge(history, live);
        let combined = render_combined(&records, self.config.display_offset())?;

        write_atomic(&self.config.combined_table_path(), &combined)?;
        if let Some(matrix) = matrix {
            write_atomic(&self.config.plain_table_path(), &matrix)?;
        }

        info!(observations, rows = records.len(), "funding tables written");
        Ok(CycleOutcome::Written {
            observations,
            rows: records.len(),
        })
    }
}
