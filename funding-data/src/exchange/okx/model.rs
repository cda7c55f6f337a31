use crate::{
    de::{de_opt_str_decimal, de_opt_str_u64_epoch_ms_as_datetime_utc, de_str_u64_epoch_ms_as_datetime_utc},
    error::AdapterError,
    exchange::ExchangeId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// OKX error code signalling the request was rejected by a rate limiter.
const RATE_LIMIT_CODE: &str = "50011";

/// Generic [`Okx`](super::Okx) V5 REST response envelope.
///
/// See docs: <https://www.okx.com/docs-v5/en/#overview-rest-authentication>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OkxResponse {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl OkxResponse {
    /// Validate the response `code` and decode the `data` array.
    pub fn into_data<T>(self) -> Result<Vec<T>, AdapterError>
    where
        T: DeserializeOwned,
    {
        match self.code.as_str() {
            "0" => serde_json::from_value(self.data).map_err(|error| AdapterError::Parse {
                exchange: ExchangeId::Okx,
                reason: error.to_string(),
            }),
            RATE_LIMIT_CODE => Err(AdapterError::RateLimit {
                exchange: ExchangeId::Okx,
                reason: format!("code {}: {}", self.code, self.msg),
            }),
            _ => Err(AdapterError::Network {
                exchange: ExchangeId::Okx,
                reason: format!("code {}: {}", self.code, self.msg),
            }),
        }
    }
}

/// [`Okx`](super::Okx) public instrument.
///
/// See docs: <https://www.okx.com/docs-v5/en/#public-data-rest-api-get-instruments>
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct OkxInstrument {
    #[serde(rename = "instId")]
    pub inst_id: String,
    /// "linear" or "inverse".
    #[serde(rename = "ctType", default)]
    pub ct_type: String,
    #[serde(rename = "settleCcy", default)]
    pub settle_ccy: String,
    /// Underlying, eg/ "BTC-USDT".
    #[serde(default)]
    pub uly: String,
    #[serde(default)]
    pub state: String,
}

impl OkxInstrument {
    /// Base & quote currencies parsed from the underlying.
    pub fn base_quote(&self) -> Option<(&str, &str)> {
        self.uly.split_once('-')
    }

    pub fn is_live(&self) -> bool {
        self.state == "live"
    }
}

/// [`Okx`](super::Okx) current funding rate.
///
/// See docs: <https://www.okx.com/docs-v5/en/#public-data-rest-api-get-funding-rate>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OkxFundingRate {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "fundingRate", default, deserialize_with = "de_opt_str_decimal")]
    pub funding_rate: Option<Decimal>,
    #[serde(
        rename = "fundingTime",
        default,
        deserialize_with = "de_opt_str_u64_epoch_ms_as_datetime_utc"
    )]
    pub funding_time: Option<DateTime<Utc>>,
    #[serde(
        rename = "nextFundingTime",
        default,
        deserialize_with = "de_opt_str_u64_epoch_ms_as_datetime_utc"
    )]
    pub next_funding_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_str_u64_epoch_ms_as_datetime_utc")]
    pub ts: Option<DateTime<Utc>>,
}

impl OkxFundingRate {
    /// Funding interval in whole hours derived from consecutive settlement times.
    pub fn interval_hours(&self) -> Option<i64> {
        let (current, next) = (self.funding_time?, self.next_funding_time?);
        let hours = (next - current).num_hours();
        (hours > 0).then_some(hours)
    }
}

/// [`Okx`](super::Okx) funding rate history entry.
///
/// See docs: <https://www.okx.com/docs-v5/en/#public-data-rest-api-get-funding-rate-history>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OkxFundingRateHistory {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "fundingRate", default, deserialize_with = "de_opt_str_decimal")]
    pub funding_rate: Option<Decimal>,
    #[serde(rename = "fundingTime", deserialize_with = "de_str_u64_epoch_ms_as_datetime_utc")]
    pub funding_time: DateTime<Utc>,
}
