use crate::{
    exchange::ExchangeId,
    history::FundingHistoryWindow,
    observation::FundingObservation,
};
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, btree_map::Entry};

/// Unique key of a [`CombinedRecord`], ordered by exchange then symbol.
#[derive(
    Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize, Constructor, Display,
)]
#[display("{exchange}||{symbol}")]
pub struct RecordKey {
    pub exchange: ExchangeId,
    pub symbol: String,
}

/// Live snapshot fields of a [`CombinedRecord`].
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct LiveFields {
    pub time: Option<DateTime<Utc>>,
    pub funding_rate: Option<Decimal>,
    pub interval: String,
    pub mark_price: Option<Decimal>,
}

impl From<FundingObservation> for LiveFields {
    fn from(observation: FundingObservation) -> Self {
        Self {
            time: observation.time,
            funding_rate: observation.funding_rate,
            interval: observation.interval,
            mark_price: observation.mark_price,
        }
    }
}

/// One row of the combined funding table: historical window averages and the live snapshot of a
/// single (exchange, symbol), either of which may be absent.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct CombinedRecord {
    pub key: RecordKey,
    pub windows: BTreeMap<u32, Decimal>,
    pub live: Option<LiveFields>,
}

impl CombinedRecord {
    pub fn window(&self, days: u32) -> Option<Decimal> {
        self.windows.get(&days).copied()
    }
}

/// Full outer join of history windows and live observations keyed by [`RecordKey`].
///
/// History rows whose windows are all zero or missing are dropped before seeding. Live
/// observations are then overlaid: a matching key gains the live fields, an unmatched key becomes
/// a live-only record. Duplicate live keys resolve last-write-wins. Output is sorted by key.
pub fn merge(
    history: impl IntoIterator<Item = FundingHistoryWindow>,
    live: impl IntoIterator<Item = FundingObservation>,
) -> Vec<CombinedRecord> {
    let mut records = history
        .into_iter()
        .filter(FundingHistoryWindow::has_signal)
        .map(|window| {
            let key = RecordKey::new(window.exchange, window.symbol);
            let record = CombinedRecord {
                key: key.clone(),
                windows: window.averages,
                live: None,
            };
            (key, record)
        })
        .collect::<BTreeMap<_, _>>();

    for observation in live {
        let key = RecordKey::new(observation.exchange, observation.symbol.clone());
        match records.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().live = Some(LiveFields::from(observation));
            }
            Entry::Vacant(entry) => {
                let key = entry.key().clone();
                entry.insert(CombinedRecord {
                    key,
                    windows: BTreeMap::new(),
                    live: Some(LiveFields::from(observation)),
                });
            }
        }
    }

    records.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::WINDOW_DAYS;
    use rust_decimal_macros::dec;

    fn window(exchange: ExchangeId, symbol: &str, average: Decimal) -> FundingHistoryWindow {
        FundingHistoryWindow {
            exchange,
            symbol: symbol.to_string(),
            averages: WINDOW_DAYS.into_iter().map(|days| (days, average)).collect(),
        }
    }

    fn live(exchange: ExchangeId, symbol: &str, rate: Decimal) -> FundingObservation {
        FundingObservation::new(exchange, symbol, Some(rate))
    }

    #[test]
    fn test_record_key_display_and_order() {
        let a = RecordKey::new(ExchangeId::Binance, "ETH/USDT:USDT".to_string());
        let b = RecordKey::new(ExchangeId::Bybit, "BTC/USDT:USDT".to_string());
        assert_eq!(a.to_string(), "binance||ETH/USDT:USDT");
        assert!(a < b);
    }

    #[test]
    fn test_merge() {
        struct TestCase {
            history: Vec<FundingHistoryWindow>,
            live: Vec<FundingObservation>,
            expected: Vec<(RecordKey, bool, bool)>,
        }

        let key = |exchange, symbol: &str| RecordKey::new(exchange, symbol.to_string());

        let tests = vec![
            TestCase {
                // TC0: matching keys are joined into a single record
                history: vec![window(ExchangeId::Bybit, "BTC/USDT:USDT", dec!(0.0001))],
                live: vec![live(ExchangeId::Bybit, "BTC/USDT:USDT", dec!(0.0002))],
                expected: vec![(key(ExchangeId::Bybit, "BTC/USDT:USDT"), true, true)],
            },
            TestCase {
                // TC1: history-only and live-only records both survive
                history: vec![window(ExchangeId::Okx, "ETH/USDT:USDT", dec!(0.0001))],
                live: vec![live(ExchangeId::Binance, "BTC/USDT:USDT", dec!(0.0002))],
                expected: vec![
                    (key(ExchangeId::Binance, "BTC/USDT:USDT"), false, true),
                    (key(ExchangeId::Okx, "ETH/USDT:USDT"), true, false),
                ],
            },
            TestCase {
                // TC2: all-zero and missing history rows are dropped
                history: vec![
                    window(ExchangeId::Okx, "ETH/USDT:USDT", Decimal::ZERO),
                    FundingHistoryWindow::missing(ExchangeId::Okx, "SOL/USDT:USDT"),
                ],
                live: vec![],
                expected: vec![],
            },
            TestCase {
                // TC3: all-zero history row dropped, live row for the same key still emitted
                history: vec![window(ExchangeId::Okx, "ETH/USDT:USDT", Decimal::ZERO)],
                live: vec![live(ExchangeId::Okx, "ETH/USDT:USDT", dec!(0.0001))],
                expected: vec![(key(ExchangeId::Okx, "ETH/USDT:USDT"), false, true)],
            },
            TestCase {
                // TC4: same symbol on two exchanges are distinct keys
                history: vec![],
                live: vec![
                    live(ExchangeId::Okx, "BTC/USDT:USDT", dec!(0.0001)),
                    live(ExchangeId::Binance, "BTC/USDT:USDT", dec!(0.0001)),
                ],
                expected: vec![
                    (key(ExchangeId::Binance, "BTC/USDT:USDT"), false, true),
                    (key(ExchangeId::Okx, "BTC/USDT:USDT"), false, true),
                ],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = merge(test.history, test.live)
                .into_iter()
                .map(|record| (record.key, !record.windows.is_empty(), record.live.is_some()))
                .collect::<Vec<_>>();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_merge_duplicate_live_keys_last_write_wins() {
        let actual = merge(
            vec![window(ExchangeId::Bybit, "BTC/USDT:USDT", dec!(0.0001))],
            vec![
                live(ExchangeId::Bybit, "BTC/USDT:USDT", dec!(0.0002)),
                live(ExchangeId::Bybit, "BTC/USDT:USDT", dec!(0.0003)),
            ],
        );

        assert_eq!(actual.len(), 1);
        assert_eq!(actual[0].window(7), Some(dec!(0.0001)));
        assert_eq!(
            actual[0].live.as_ref().and_then(|live| live.funding_rate),
            Some(dec!(0.0003))
        );
    }
}
