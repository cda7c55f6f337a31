use crate::{
    exchange::{ExchangeId, FundingAdapter},
    observation::FundingObservation,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{Instrument, Span, debug, info, info_span, warn};

/// Rolling window lengths, in days, averaged for every symbol.
pub const WINDOW_DAYS: [u32; 5] = [1, 2, 3, 5, 7];

/// History lookback covering the longest window.
pub const HISTORY_LOOKBACK_DAYS: i64 = 7;

/// Multi-window funding rate averages of one symbol on one exchange.
///
/// Empty `averages` means the history fetch failed and every window is missing, which is distinct
/// from a window that contained no entries (averaged to zero).
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct FundingHistoryWindow {
    pub exchange: ExchangeId,
    pub symbol: String,
    pub averages: BTreeMap<u32, Decimal>,
}

impl FundingHistoryWindow {
    /// Window averages derived from a successfully fetched history series.
    pub fn from_history(
        exchange: ExchangeId,
        symbol: impl Into<String>,
        history: &[FundingObservation],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            averages: window_averages(history, now),
        }
    }

    /// Window set of a symbol whose history fetch failed.
    pub fn missing(exchange: ExchangeId, symbol: impl Into<String>) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            averages: BTreeMap::new(),
        }
    }

    pub fn average(&self, days: u32) -> Option<Decimal> {
        self.averages.get(&days).copied()
    }

    /// True when at least one window holds a non-zero average.
    pub fn has_signal(&self) -> bool {
        self.averages.values().any(|average| !average.is_zero())
    }
}

/// Reduce a funding rate history to the average daily rate of every window in [`WINDOW_DAYS`].
///
/// Each window average is the sum of the rates with `time >= now - days`, divided by `days`.
/// Entries lacking a time or a rate never fall in any window.
pub fn window_averages(history: &[FundingObservation], now: DateTime<Utc>) -> BTreeMap<u32, Decimal> {
    WINDOW_DAYS
        .into_iter()
        .map(|days| {
            let cutoff = now - ChronoDuration::days(i64::from(days));
            let sum = history
                .iter()
                .filter_map(|entry| match (entry.time, entry.funding_rate) {
                    (Some(time), Some(rate)) if time >= cutoff => Some(rate),
                    _ => None,
                })
                .sum::<Decimal>();

            (days, sum / Decimal::from(days))
        })
        .collect()
}

/// Quote currency of a unified `BASE/QUOTE:SETTLE` symbol.
pub fn symbol_quote(symbol: &str) -> Option<&str> {
    let (_, rest) = symbol.split_once('/')?;
    Some(rest.split_once(':').map_or(rest, |(quote, _)| quote))
}

/// Fetches each contract symbol's funding history once per cycle and reduces it to
/// [`FundingHistoryWindow`]s.
#[derive(Clone, Debug)]
pub struct HistoryAggregator {
    lookback: ChronoDuration,
    quotes: Vec<String>,
    parallel: bool,
}

impl Default for HistoryAggregator {
    fn default() -> Self {
        Self {
            lookback: ChronoDuration::days(HISTORY_LOOKBACK_DAYS),
            quotes: Vec::new(),
            parallel: false,
        }
    }
}

impl HistoryAggregator {
    /// Restrict the history universe to symbols quoted in one of `quotes`.
    pub fn with_quotes(self, quotes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            quotes: quotes.into_iter().map(|quote| quote.into().to_uppercase()).collect(),
            ..self
        }
    }

    pub fn with_parallel(self, parallel: bool) -> Self {
        Self { parallel, ..self }
    }

    fn wants(&self, symbol: &str) -> bool {
        self.quotes.is_empty()
            || symbol_quote(symbol).is_some_and(|quote| self.quotes.iter().any(|q| q == quote))
    }

    /// Aggregate the funding history of every contract symbol on every adapter.
    ///
    /// An exchange whose markets cannot be loaded contributes nothing. A symbol whose history
    /// fetch fails is still emitted, with every window missing.
    pub async fn aggregate(
        &self,
        adapters: &[Arc<dyn FundingAdapter>],
        now: DateTime<Utc>,
        span: &Span,
    ) -> Vec<FundingHistoryWindow> {
        let futures = adapters.iter().map(|adapter| {
            let span = info_span!(parent: span, "history", exchange = %adapter.exchange());
            self.aggregate_exchange(adapter.as_ref(), now).instrument(span)
        });

        let windows: Vec<Vec<FundingHistoryWindow>> = if self.parallel {
            join_all(futures).await
        } else {
            let mut windows = Vec::with_capacity(adapters.len());
            for future in futures {
                windows.push(future.await);
            }
            windows
        };

        windows.into_iter().flatten().collect()
    }

    async fn aggregate_exchange(
        &self,
        adapter: &dyn FundingAdapter,
        now: DateTime<Utc>,
    ) -> Vec<FundingHistoryWindow> {
        let exchange = adapter.exchange();

        if let Err(error) = adapter.load_markets().await {
            warn!(%error, "excluding exchange from funding history");
            return Vec::new();
        }

        let since = now - self.lookback;
        let mut windows = Vec::new();
        let mut failures = 0usize;

        for symbol in adapter
            .contract_symbols()
            .into_iter()
            .filter(|symbol| self.wants(symbol))
        {
            let window = match adapter.fetch_funding_rate_history(&symbol, since).await {
                Ok(history) => {
                    debug!(%symbol, entries = history.len(), "fetched funding history");
                    FundingHistoryWindow::from_history(exchange, symbol, &history, now)
                }
                Err(error) => {
                    failures += 1;
                    debug!(%symbol, %error, "funding history unavailable");
                    FundingHistoryWindow::missing(exchange, symbol)
                }
            };
            windows.push(window);
        }

        info!(symbols = windows.len(), failures, "aggregated funding history");
        windows
    }
}
