use crate::{
    config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY},
    error::AdapterError,
    exchange::FundingAdapter,
    observation::FundingObservation,
};
use futures::future::join_all;
use itertools::Itertools;
use std::{sync::Arc, time::Duration};
use tracing::{Instrument, Span, debug, info, info_span, warn};

/// Collects the current funding rate of every contract symbol across exchanges.
///
/// Per exchange, a bulk request is preferred when the adapter supports it, falling back to one
/// request per symbol. An exchange that fails outright is retried up to `max_attempts` times and
/// then contributes nothing, leaving its siblings unaffected.
#[derive(Clone, Debug)]
pub struct SnapshotCollector {
    max_attempts: usize,
    retry_delay: Duration,
    parallel: bool,
}

impl Default for SnapshotCollector {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            parallel: false,
        }
    }
}

impl SnapshotCollector {
    pub fn with_max_attempts(self, max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self
        }
    }

    pub fn with_retry_delay(self, retry_delay: Duration) -> Self {
        Self {
            retry_delay,
            ..self
        }
    }

    pub fn with_parallel(self, parallel: bool) -> Self {
        Self { parallel, ..self }
    }

    /// Collect live [`FundingObservation`]s from every adapter, in adapter order.
    pub async fn collect(
        &self,
        adapters: &[Arc<dyn FundingAdapter>],
        span: &Span,
    ) -> Vec<FundingObservation> {
        let futures = adapters.iter().map(|adapter| {
            let span = info_span!(parent: span, "snapshot", exchange = %adapter.exchange());
            self.collect_exchange(adapter.as_ref()).instrument(span)
        });

        let observations: Vec<Vec<FundingObservation>> = if self.parallel {
            join_all(futures).await
        } else {
            let mut observations = Vec::with_capacity(adapters.len());
            for future in futures {
                observations.push(future.await);
            }
            observations
        };

        observations.into_iter().flatten().collect()
    }

    async fn collect_exchange(&self, adapter: &dyn FundingAdapter) -> Vec<FundingObservation> {
        for attempt in 1..=self.max_attempts {
            match self.fetch_once(adapter).await {
                Ok(observations) => {
                    info!(attempt, observations = observations.len(), "collected funding rates");
                    return observations;
                }
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, %error, "funding rate collection failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(error) => {
                    warn!(attempt, %error, "funding rate collection failed, skipping exchange");
                    return Vec::new();
                }
            }
        }

        Vec::new()
    }

    /// Single collection attempt for one exchange.
    ///
    /// Fails only when the markets cannot be loaded, or when every per-symbol request failed. In
    /// the latter case the first retryable error is returned if any request failed with one,
    /// otherwise the first error.
    async fn fetch_once(
        &self,
        adapter: &dyn FundingAdapter,
    ) -> Result<Vec<FundingObservation>, AdapterError> {
        adapter.load_markets().await?;

        if adapter.supports_bulk_funding_rates() {
            match adapter.fetch_bulk_funding_rates(None).await {
                Ok(rates) => {
                    let total = rates.len();
                    let observations = rates
                        .into_values()
                        .filter(|observation| observation.funding_rate.is_some())
                        .sorted_by(|a, b| a.symbol.cmp(&b.symbol))
                        .collect::<Vec<_>>();
                    debug!(total, kept = observations.len(), "bulk funding rates fetched");
                    return Ok(observations);
                }
                Err(error) => {
                    debug!(%error, "bulk funding rates unavailable, falling back to per-symbol");
                }
            }
        }

        let symbols = adapter.contract_symbols();
        let mut observations = Vec::with_capacity(symbols.len());
        let mut first_error: Option<AdapterError> = None;
        let mut failures = 0usize;

        for symbol in &symbols {
            match adapter.fetch_funding_rate(symbol).await {
                Ok(observation) if observation.funding_rate.is_some() => {
                    observations.push(observation)
                }
                Ok(_) => debug!(%symbol, "dropping null funding rate"),
                Err(error) => {
                    debug!(%symbol, %error, "funding rate unavailable");
                    failures += 1;
                    let replace = first_error
                        .as_ref()
                        .is_none_or(|first| !first.is_retryable() && error.is_retryable());
                    if replace {
                        first_error = Some(error);
                    }
                }
            }
        }

        match first_error {
            Some(error) if failures == symbols.len() => Err(error),
            _ => Ok(observations),
        }
    }
}
