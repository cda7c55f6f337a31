//! Serde helpers for the stringly-typed numeric fields returned by exchange REST APIs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, de::Error};
use std::str::FromStr;

/// Deserialise a `String` decimal, treating empty strings and `null` as `None`.
pub fn de_opt_str_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    match value {
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_decimal(&raw).map(Some).map_err(Error::custom),
        None => Ok(None),
    }
}

/// Deserialise a `u64` epoch milliseconds number as a `DateTime<Utc>`.
pub fn de_u64_epoch_ms_as_datetime_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let epoch_ms = u64::deserialize(deserializer)?;
    datetime_utc_from_epoch_ms(epoch_ms).map_err(Error::custom)
}

/// Deserialise an optional `u64` epoch milliseconds number as an `Option<DateTime<Utc>>`.
pub fn de_opt_u64_epoch_ms_as_datetime_utc<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<u64> = Option::deserialize(deserializer)?;
    value
        .map(datetime_utc_from_epoch_ms)
        .transpose()
        .map_err(Error::custom)
}

/// Deserialise a `String` epoch milliseconds value as a `DateTime<Utc>`.
pub fn de_str_u64_epoch_ms_as_datetime_utc<'de, D>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let epoch_ms = raw.trim().parse::<u64>().map_err(Error::custom)?;
    datetime_utc_from_epoch_ms(epoch_ms).map_err(Error::custom)
}

/// Deserialise an optional `String` epoch milliseconds value, treating empty strings as `None`.
pub fn de_opt_str_u64_epoch_ms_as_datetime_utc<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    match value {
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => {
            let epoch_ms = raw.trim().parse::<u64>().map_err(Error::custom)?;
            datetime_utc_from_epoch_ms(epoch_ms)
                .map(Some)
                .map_err(Error::custom)
        }
        None => Ok(None),
    }
}

/// Parse a decimal string, accepting the scientific notation some venues emit for tiny rates.
pub fn parse_decimal(raw: &str) -> Result<Decimal, rust_decimal::Error> {
    let raw = raw.trim();
    Decimal::from_str(raw).or_else(|_| Decimal::from_scientific(raw))
}

pub fn datetime_utc_from_epoch_ms(epoch_ms: u64) -> Result<DateTime<Utc>, String> {
    i64::try_from(epoch_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| format!("epoch milliseconds out of range: {epoch_ms}"))
}
