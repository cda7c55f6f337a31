use crate::{
    de::{de_opt_str_decimal, de_opt_u64_epoch_ms_as_datetime_utc, de_str_u64_epoch_ms_as_datetime_utc},
    error::AdapterError,
    exchange::ExchangeId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Bybit `retCode`s signalling the request was rejected by a rate limiter.
const RATE_LIMIT_RET_CODES: [i64; 2] = [10006, 10018];

/// Generic [`Bybit`](super::Bybit) V5 REST response envelope.
///
/// The `result` is kept as raw JSON since Bybit returns an empty object on error.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/intro>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BybitResponse {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default, deserialize_with = "de_opt_u64_epoch_ms_as_datetime_utc")]
    pub time: Option<DateTime<Utc>>,
}

impl BybitResponse {
    /// Validate the `retCode` and decode the `result` payload.
    pub fn into_result<T>(self) -> Result<T, AdapterError>
    where
        T: DeserializeOwned,
    {
        match self.ret_code {
            0 => serde_json::from_value(self.result).map_err(|error| AdapterError::Parse {
                exchange: ExchangeId::Bybit,
                reason: error.to_string(),
            }),
            code if RATE_LIMIT_RET_CODES.contains(&code) => Err(AdapterError::RateLimit {
                exchange: ExchangeId::Bybit,
                reason: format!("retCode {code}: {}", self.ret_msg),
            }),
            code => Err(AdapterError::Network {
                exchange: ExchangeId::Bybit,
                reason: format!("retCode {code}: {}", self.ret_msg),
            }),
        }
    }
}

/// Paged `result.list` payload.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BybitList<T> {
    pub list: Vec<T>,
    #[serde(rename = "nextPageCursor", default)]
    pub next_page_cursor: String,
}

/// [`Bybit`](super::Bybit) `instruments-info` entry.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/instrument>
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct BybitInstrument {
    pub symbol: String,
    #[serde(rename = "contractType", default)]
    pub contract_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "baseCoin")]
    pub base_coin: String,
    #[serde(rename = "quoteCoin")]
    pub quote_coin: String,
    #[serde(rename = "settleCoin")]
    pub settle_coin: String,
    /// Funding interval in minutes.
    #[serde(rename = "fundingInterval", default)]
    pub funding_interval: i64,
}

impl BybitInstrument {
    pub fn is_trading_perpetual(&self) -> bool {
        self.contract_type.ends_with("Perpetual") && self.status == "Trading"
    }
}

/// [`Bybit`](super::Bybit) `tickers` entry carrying mark price & current funding rate.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/tickers>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BybitTicker {
    pub symbol: String,
    #[serde(rename = "markPrice", default, deserialize_with = "de_opt_str_decimal")]
    pub mark_price: Option<Decimal>,
    #[serde(rename = "fundingRate", default, deserialize_with = "de_opt_str_decimal")]
    pub funding_rate: Option<Decimal>,
}

/// [`Bybit`](super::Bybit) `funding/history` entry.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/history-fund-rate>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BybitFundingRate {
    pub symbol: String,
    #[serde(rename = "fundingRate", default, deserialize_with = "de_opt_str_decimal")]
    pub funding_rate: Option<Decimal>,
    #[serde(
        rename = "fundingRateTimestamp",
        deserialize_with = "de_str_u64_epoch_ms_as_datetime_utc"
    )]
    pub time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bybit_response_into_result() {
        struct TestCase {
            input: &'static str,
            expected: Result<usize, AdapterError>,
        }

        let tests = vec![
            TestCase {
                // TC0: successful tickers response
                input: r#"{
                    "retCode": 0,
                    "retMsg": "OK",
                    "result": {
                        "category": "linear",
                        "list": [
                            {"symbol": "BTCUSDT", "markPrice": "64011.20", "fundingRate": "0.0001", "nextFundingTime": "1714492800000"},
                            {"symbol": "BTC-27SEP24", "markPrice": "66123.00", "fundingRate": "", "nextFundingTime": ""}
                        ]
                    },
                    "retExtInfo": {},
                    "time": 1714480000000
                }"#,
                expected: Ok(2),
            },
            TestCase {
                // TC1: rate limited
                input: r#"{"retCode": 10006, "retMsg": "Too many visits!", "result": {}, "time": 1714480000000}"#,
                expected: Err(AdapterError::RateLimit {
                    exchange: ExchangeId::Bybit,
                    reason: "retCode 10006: Too many visits!".to_string(),
                }),
            },
            TestCase {
                // TC2: other error code
                input: r#"{"retCode": 10001, "retMsg": "params error: symbol invalid", "result": {}}"#,
                expected: Err(AdapterError::Network {
                    exchange: ExchangeId::Bybit,
                    reason: "retCode 10001: params error: symbol invalid".to_string(),
                }),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<BybitResponse>(test.input)
                .unwrap()
                .into_result::<BybitList<BybitTicker>>()
                .map(|list| list.list.len());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_de_bybit_ticker_empty_funding_rate() {
        let input = r#"{"symbol": "BTC-27SEP24", "markPrice": "66123.00", "fundingRate": ""}"#;
        let actual = serde_json::from_str::<BybitTicker>(input).unwrap();
        assert_eq!(
            actual,
            BybitTicker {
                symbol: "BTC-27SEP24".to_string(),
                mark_price: Some(dec!(66123.00)),
                funding_rate: None,
            }
        );
    }

    #[test]
    fn test_de_bybit_instrument() {
        let input = r#"{
            "symbol": "BTCUSDT",
            "contractType": "LinearPerpetual",
            "status": "Trading",
            "baseCoin": "BTC",
            "quoteCoin": "USDT",
            "launchTime": "1585526400000",
            "settleCoin": "USDT",
            "fundingInterval": 480,
            "copyTrading": "both"
        }"#;
        let actual = serde_json::from_str::<BybitInstrument>(input).unwrap();
        assert!(actual.is_trading_perpetual());
        assert_eq!(actual.funding_interval, 480);

        let input = r#"{
            "symbol": "BTC-27SEP24",
            "contractType": "LinearFutures",
            "status": "Trading",
            "baseCoin": "BTC",
            "quoteCoin": "USDC",
            "settleCoin": "USDC",
            "fundingInterval": 0
        }"#;
        let actual = serde_json::from_str::<BybitInstrument>(input).unwrap();
        assert!(!actual.is_trading_perpetual());
    }

    #[test]
    fn test_de_bybit_funding_rate_history() {
        let input = r#"{"symbol": "ETHPERP", "fundingRate": "0.0001", "fundingRateTimestamp": "1672041600000"}"#;
        let actual = serde_json::from_str::<BybitFundingRate>(input).unwrap();
        assert_eq!(actual.funding_rate, Some(dec!(0.0001)));
        assert_eq!(actual.time, DateTime::from_timestamp_millis(1672041600000).unwrap());
    }
}
