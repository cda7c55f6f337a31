use crate::exchange::ExchangeId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Funding interval label used when an exchange does not report one.
pub const DEFAULT_FUNDING_INTERVAL: &str = "8h";

/// Normalised funding rate reading for one symbol on one exchange.
///
/// Used both for live snapshots and for the entries of a funding rate history series.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct FundingObservation {
    pub exchange: ExchangeId,
    /// Unified `BASE/QUOTE:SETTLE` symbol.
    pub symbol: String,
    /// Funding rate as a fraction of notional (0.0001 == 0.01%).
    ///
    /// `None` when the exchange reported the field as null or empty.
    pub funding_rate: Option<Decimal>,
    /// Exchange timestamp of the reading (funding time for history entries).
    pub time: Option<DateTime<Utc>>,
    pub mark_price: Option<Decimal>,
    /// Funding interval label, eg/ "8h".
    pub interval: String,
}

impl FundingObservation {
    /// Construct a [`FundingObservation`] with the default funding interval and no optional fields.
    pub fn new(exchange: ExchangeId, symbol: impl Into<String>, funding_rate: Option<Decimal>) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            funding_rate,
            time: None,
            mark_price: None,
            interval: DEFAULT_FUNDING_INTERVAL.to_string(),
        }
    }

    pub fn with_time(self, time: DateTime<Utc>) -> Self {
        Self {
            time: Some(time),
            ..self
        }
    }

    pub fn with_mark_price(self, mark_price: Decimal) -> Self {
        Self {
            mark_price: Some(mark_price),
            ..self
        }
    }

    pub fn with_interval(self, interval: impl Into<String>) -> Self {
        Self {
            interval: interval.into(),
            ..self
        }
    }
}

/// Format a funding interval expressed in whole hours, eg/ `8` -> "8h".
pub fn interval_label_from_hours(hours: i64) -> String {
    format!("{hours}h")
}

/// Format a funding interval expressed in minutes, falling back to the default label for zero or
/// non whole-hour values.
pub fn interval_label_from_minutes(minutes: i64) -> String {
    if minutes > 0 && minutes % 60 == 0 {
        interval_label_from_hours(minutes / 60)
    } else {
        DEFAULT_FUNDING_INTERVAL.to_string()
    }
}
