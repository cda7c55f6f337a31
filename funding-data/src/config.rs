use crate::exchange::{ExchangeId, MarketType, rest::RestConfig};
use chrono::{FixedOffset, Offset, Utc};
use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};
use tracing::warn;

/// Default directory the funding tables are written to.
pub const DEFAULT_DATA_DIR: &str = "data";

/// File name of the plain `symbol` x exchange funding rate matrix.
pub const PLAIN_TABLE_FILE: &str = "all_funding_rates.csv";

/// File name of the combined history & live funding table.
pub const COMBINED_TABLE_FILE: &str = "combined_all_fundingfee.csv";

/// Default time between the start of consecutive cycles.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(20 * 60);

/// Default number of attempts made to collect an exchange before it is skipped for the cycle.
pub const DEFAULT_MAX_ATTEMPTS: usize = 2;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default display offset for the combined table `datetime` column (UTC+8).
pub const DEFAULT_DISPLAY_OFFSET_HOURS: i32 = 8;

/// Per-exchange configuration, parsed from entries such as `binance`, `bybit:inverse` or
/// `okx:nolimit`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct ExchangeConfig {
    pub exchange: ExchangeId,
    /// Space consecutive requests to stay within the exchange public rate limits.
    pub rate_limit: bool,
    pub market_type: MarketType,
}

impl ExchangeConfig {
    pub fn new(exchange: ExchangeId) -> Self {
        Self {
            exchange,
            rate_limit: true,
            market_type: MarketType::default(),
        }
    }

    pub fn with_rate_limit(self, rate_limit: bool) -> Self {
        Self { rate_limit, ..self }
    }

    pub fn with_market_type(self, market_type: MarketType) -> Self {
        Self { market_type, ..self }
    }
}

impl FromStr for ExchangeConfig {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = input.trim().split(':');
        let exchange = parts.next().unwrap_or_default().parse::<ExchangeId>()?;

        parts.try_fold(ExchangeConfig::new(exchange), |config, flag| {
            match flag.trim().to_ascii_lowercase().as_str() {
                "linear" => Ok(config.with_market_type(MarketType::Linear)),
                "inverse" => Ok(config.with_market_type(MarketType::Inverse)),
                "limit" => Ok(config.with_rate_limit(true)),
                "nolimit" => Ok(config.with_rate_limit(false)),
                other => Err(format!("unknown flag '{other}' for exchange {exchange}")),
            }
        })
    }
}

/// Parse a comma separated list of [`ExchangeConfig`]s, preserving order and ignoring blanks.
///
/// An exchange listed more than once keeps its first entry.
pub fn parse_exchanges(input: &str) -> Result<Vec<ExchangeConfig>, String> {
    input
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<_>, _>>()
        .map(dedup_exchanges)
}

/// Drop every [`ExchangeConfig`] whose exchange was already configured, keeping first entries.
pub fn dedup_exchanges(
    exchanges: impl IntoIterator<Item = ExchangeConfig>,
) -> Vec<ExchangeConfig> {
    let mut seen = FnvHashSet::default();
    exchanges
        .into_iter()
        .filter(|config| {
            let first = seen.insert(config.exchange);
            if !first {
                warn!(
                    exchange = %config.exchange,
                    "exchange configured more than once, keeping first entry"
                );
            }
            first
        })
        .collect()
}

/// Exchanges collected when none are configured.
pub fn default_exchanges() -> Vec<ExchangeConfig> {
    ExchangeId::ALL.into_iter().map(ExchangeConfig::new).collect()
}

/// Configuration of a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Clone, PartialEq, Debug)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    /// Exchanges to collect, in plain matrix column order.
    pub exchanges: Vec<ExchangeConfig>,
    pub cycle_interval: Duration,
    pub max_attempts: usize,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub display_offset_hours: i32,
    /// Collect exchanges concurrently rather than one after another.
    pub parallel_exchanges: bool,
    /// Restrict the history universe to these quote currencies. Empty means every symbol.
    pub history_quotes: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            exchanges: default_exchanges(),
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            request_timeout: RestConfig::default().request_timeout,
            display_offset_hours: DEFAULT_DISPLAY_OFFSET_HOURS,
            parallel_exchanges: false,
            history_quotes: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Build a [`PipelineConfig`] from `FUNDING_*` environment variables, falling back to the
    /// default for any variable that is unset or invalid.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a [`PipelineConfig`] from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        let parse = |key: &str| lookup(key).and_then(|value| value.trim().parse::<u64>().ok());

        let exchanges = match lookup("FUNDING_EXCHANGES") {
            Some(value) => match parse_exchanges(&value) {
                Ok(exchanges) if !exchanges.is_empty() => exchanges,
                Ok(_) => default.exchanges.clone(),
                Err(error) => {
                    warn!(%error, "invalid FUNDING_EXCHANGES, using default exchanges");
                    default.exchanges.clone()
                }
            },
            None => default.exchanges.clone(),
        };

        Self {
            data_dir: lookup("FUNDING_DATA_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.data_dir),
            exchanges,
            cycle_interval: parse("FUNDING_CYCLE_MINUTES")
                .filter(|minutes| *minutes > 0)
                .map(|minutes| Duration::from_secs(minutes * 60))
                .unwrap_or(default.cycle_interval),
            max_attempts: parse("FUNDING_MAX_ATTEMPTS")
                .filter(|attempts| *attempts > 0)
                .map(|attempts| attempts as usize)
                .unwrap_or(default.max_attempts),
            retry_delay: parse("FUNDING_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.retry_delay),
            request_timeout: parse("FUNDING_REQUEST_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(default.request_timeout),
            display_offset_hours: lookup("FUNDING_DISPLAY_UTC_OFFSET_HOURS")
                .and_then(|value| value.trim().parse::<i32>().ok())
                .filter(|hours| (-23..=23).contains(hours))
                .unwrap_or(default.display_offset_hours),
            parallel_exchanges: lookup("FUNDING_PARALLEL_EXCHANGES")
                .map(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "yes"))
                .unwrap_or(default.parallel_exchanges),
            history_quotes: lookup("FUNDING_HISTORY_QUOTE")
                .map(|value| {
                    value
                        .split(',')
                        .map(|quote| quote.trim().to_uppercase())
                        .filter(|quote| !quote.is_empty())
                        .collect()
                })
                .unwrap_or(default.history_quotes),
        }
    }

    pub fn with_data_dir(self, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..self
        }
    }

    pub fn with_exchanges(self, exchanges: impl IntoIterator<Item = ExchangeConfig>) -> Self {
        Self {
            exchanges: dedup_exchanges(exchanges),
            ..self
        }
    }

    pub fn with_cycle_interval(self, cycle_interval: Duration) -> Self {
        Self {
            cycle_interval,
            ..self
        }
    }

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

    pub fn with_request_timeout(self, request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            ..self
        }
    }

    pub fn with_display_offset_hours(self, display_offset_hours: i32) -> Self {
        Self {
            display_offset_hours,
            ..self
        }
    }

    pub fn with_parallel_exchanges(self, parallel_exchanges: bool) -> Self {
        Self {
            parallel_exchanges,
            ..self
        }
    }

    pub fn with_history_quotes(self, quotes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            history_quotes: quotes.into_iter().map(|quote| quote.into().to_uppercase()).collect(),
            ..self
        }
    }

    pub fn plain_table_path(&self) -> PathBuf {
        self.data_dir.join(PLAIN_TABLE_FILE)
    }

    pub fn combined_table_path(&self) -> PathBuf {
        self.data_dir.join(COMBINED_TABLE_FILE)
    }

    /// Offset the combined table `datetime` column is rendered in. Out of range offsets render
    /// in UTC.
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.display_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Exchange ids in configured order.
    pub fn exchange_ids(&self) -> Vec<ExchangeId> {
        self.exchanges.iter().map(|config| config.exchange).collect()
    }

    pub fn rest_config(&self) -> RestConfig {
        RestConfig::default().with_request_timeout(self.request_timeout)
    }
}
