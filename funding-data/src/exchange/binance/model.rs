use crate::de::{
    de_opt_str_decimal, de_opt_u64_epoch_ms_as_datetime_utc, de_u64_epoch_ms_as_datetime_utc,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// [`Binance`](super::Binance) futures `exchangeInfo` response.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api/Exchange-Information>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceExchangeInfo {
    pub symbols: Vec<BinanceSymbol>,
}

/// [`Binance`](super::Binance) futures market metadata.
///
/// USD-M markets report `status`, COIN-M markets report `contractStatus`.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct BinanceSymbol {
    pub symbol: String,
    #[serde(rename = "contractType", default)]
    pub contract_type: String,
    #[serde(alias = "contractStatus", default)]
    pub status: String,
    #[serde(rename = "baseAsset")]
    pub base_asset: String,
    #[serde(rename = "quoteAsset")]
    pub quote_asset: String,
    #[serde(rename = "marginAsset")]
    pub margin_asset: String,
}

impl BinanceSymbol {
    /// Only trading perpetual contracts carry a funding rate.
    pub fn is_trading_perpetual(&self) -> bool {
        self.contract_type == "PERPETUAL" && self.status == "TRADING"
    }
}

/// [`Binance`](super::Binance) `premiumIndex` entry carrying mark price & last funding rate.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api/Mark-Price>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinancePremiumIndex {
    pub symbol: String,
    #[serde(rename = "markPrice", default, deserialize_with = "de_opt_str_decimal")]
    pub mark_price: Option<Decimal>,
    #[serde(
        rename = "lastFundingRate",
        default,
        deserialize_with = "de_opt_str_decimal"
    )]
    pub last_funding_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "de_opt_u64_epoch_ms_as_datetime_utc")]
    pub time: Option<DateTime<Utc>>,
}

/// [`Binance`](super::Binance) `fundingInfo` entry, only present for symbols with an adjusted
/// funding interval.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api/Get-Funding-Rate-Info>
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct BinanceFundingInfo {
    pub symbol: String,
    #[serde(rename = "fundingIntervalHours")]
    pub funding_interval_hours: i64,
}

/// [`Binance`](super::Binance) `fundingRate` history entry.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api/Get-Funding-Rate-History>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceFundingRate {
    pub symbol: String,
    #[serde(rename = "fundingRate", default, deserialize_with = "de_opt_str_decimal")]
    pub funding_rate: Option<Decimal>,
    #[serde(rename = "fundingTime", deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    pub funding_time: DateTime<Utc>,
    #[serde(rename = "markPrice", default, deserialize_with = "de_opt_str_decimal")]
    pub mark_price: Option<Decimal>,
}

/// Binance endpoints answer with either a single object or an array depending on the market
/// family & query parameters.
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_de_binance_symbol() {
        struct TestCase {
            input: &'static str,
            expected: BinanceSymbol,
            perpetual: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: USD-M perpetual w/ status
                input: r#"{
                    "symbol": "BTCUSDT",
                    "pair": "BTCUSDT",
                    "contractType": "PERPETUAL",
                    "deliveryDate": 4133404800000,
                    "status": "TRADING",
                    "baseAsset": "BTC",
                    "quoteAsset": "USDT",
                    "marginAsset": "USDT"
                }"#,
                expected: BinanceSymbol {
                    symbol: "BTCUSDT".to_string(),
                    contract_type: "PERPETUAL".to_string(),
                    status: "TRADING".to_string(),
                    base_asset: "BTC".to_string(),
                    quote_asset: "USDT".to_string(),
                    margin_asset: "USDT".to_string(),
                },
                perpetual: true,
            },
            TestCase {
                // TC1: COIN-M quarterly w/ contractStatus
                input: r#"{
                    "symbol": "BTCUSD_250627",
                    "pair": "BTCUSD",
                    "contractType": "CURRENT_QUARTER",
                    "contractStatus": "TRADING",
                    "baseAsset": "BTC",
                    "quoteAsset": "USD",
                    "marginAsset": "BTC"
                }"#,
                expected: BinanceSymbol {
                    symbol: "BTCUSD_250627".to_string(),
                    contract_type: "CURRENT_QUARTER".to_string(),
                    status: "TRADING".to_string(),
                    base_asset: "BTC".to_string(),
                    quote_asset: "USD".to_string(),
                    margin_asset: "BTC".to_string(),
                },
                perpetual: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<BinanceSymbol>(test.input).unwrap();
            assert_eq!(actual, test.expected, "TC{} failed", index);
            assert_eq!(actual.is_trading_perpetual(), test.perpetual, "TC{} failed", index);
        }
    }

    #[test]
    fn test_de_binance_premium_index_one_or_many() {
        let one = r#"{
            "symbol": "BTCUSDT",
            "markPrice": "11793.63104562",
            "indexPrice": "11781.80495970",
            "estimatedSettlePrice": "11781.16138815",
            "lastFundingRate": "0.00038246",
            "interestRate": "0.00010000",
            "nextFundingTime": 1597392000000,
            "time": 1597370495002
        }"#;

        let actual = serde_json::from_str::<OneOrMany<BinancePremiumIndex>>(one)
            .unwrap()
            .into_vec();
        assert_eq!(
            actual,
            vec![BinancePremiumIndex {
                symbol: "BTCUSDT".to_string(),
                mark_price: Some(dec!(11793.63104562)),
                last_funding_rate: Some(dec!(0.00038246)),
                time: DateTime::from_timestamp_millis(1597370495002),
            }]
        );

        let many = r#"[
            {"symbol": "BTCUSD_PERP", "markPrice": "11029.69574559", "lastFundingRate": "0.00010000", "time": 1596096134000},
            {"symbol": "BTCUSD_201225", "markPrice": "11230.34", "lastFundingRate": "", "time": 1596096134000}
        ]"#;
        let actual = serde_json::from_str::<OneOrMany<BinancePremiumIndex>>(many)
            .unwrap()
            .into_vec();
        assert_eq!(actual.len(), 2);
        assert_eq!(actual[0].last_funding_rate, Some(dec!(0.0001)));
        assert_eq!(actual[1].last_funding_rate, None);
    }

    #[test]
    fn test_de_binance_funding_rate_history() {
        let input = r#"[
            {"symbol": "BTCUSDT", "fundingRate": "-0.03750000", "fundingTime": 1570608000000, "markPrice": "34287.54619963"},
            {"symbol": "BTCUSDT", "fundingRate": "0.00010000", "fundingTime": 1570636800000, "markPrice": ""}
        ]"#;

        let actual = serde_json::from_str::<Vec<BinanceFundingRate>>(input).unwrap();
        assert_eq!(actual[0].funding_rate, Some(dec!(-0.0375)));
        assert_eq!(
            actual[0].funding_time,
            DateTime::from_timestamp_millis(1570608000000).unwrap()
        );
        assert_eq!(actual[1].mark_price, None);
    }
}
