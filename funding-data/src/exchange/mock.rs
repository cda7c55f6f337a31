use super::{ExchangeId, FundingAdapter, Market, Markets};
use crate::{error::AdapterError, observation::FundingObservation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use parking_lot::{Mutex, RwLock};

/// Number of calls a [`MockAdapter`] received, per operation.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct MockCalls {
    pub load_markets: usize,
    pub bulk: usize,
    pub single: usize,
    pub history: usize,
}

/// In-memory [`FundingAdapter`] returning scripted responses.
///
/// Symbols without a scripted per-symbol rate fail with [`AdapterError::UnknownSymbol`], and
/// symbols without scripted history return an empty series.
#[derive(Debug)]
pub struct MockAdapter {
    exchange: ExchangeId,
    available: Vec<Market>,
    markets: RwLock<Markets>,
    bulk: Option<Result<Vec<FundingObservation>, AdapterError>>,
    rates: FnvHashMap<String, Result<FundingObservation, AdapterError>>,
    history: FnvHashMap<String, Result<Vec<FundingObservation>, AdapterError>>,
    load_failures: Mutex<usize>,
    calls: Mutex<MockCalls>,
}

impl MockAdapter {
    /// Construct a [`MockAdapter`] with no markets and no bulk capability.
    pub fn new(exchange: ExchangeId) -> Self {
        Self {
            exchange,
            available: Vec::new(),
            markets: RwLock::new(Markets::default()),
            bulk: None,
            rates: FnvHashMap::default(),
            history: FnvHashMap::default(),
            load_failures: Mutex::new(0),
            calls: Mutex::new(MockCalls::default()),
        }
    }

    pub fn with_markets(self, markets: impl IntoIterator<Item = Market>) -> Self {
        Self {
            available: markets.into_iter().collect(),
            ..self
        }
    }

    /// Enable bulk capability, answering every bulk request with the provided result.
    pub fn with_bulk(self, bulk: Result<Vec<FundingObservation>, AdapterError>) -> Self {
        Self {
            bulk: Some(bulk),
            ..self
        }
    }

    pub fn with_rate(
        mut self,
        symbol: impl Into<String>,
        rate: Result<FundingObservation, AdapterError>,
    ) -> Self {
        self.rates.insert(symbol.into(), rate);
        self
    }

    pub fn with_history(
        mut self,
        symbol: impl Into<String>,
        history: Result<Vec<FundingObservation>, AdapterError>,
    ) -> Self {
        self.history.insert(symbol.into(), history);
        self
    }

    /// Fail the next `failures` calls to [`FundingAdapter::load_markets`].
    pub fn with_load_failures(self, failures: usize) -> Self {
        Self {
            load_failures: Mutex::new(failures),
            ..self
        }
    }

    pub fn calls(&self) -> MockCalls {
        *self.calls.lock()
    }
}

#[async_trait]
impl FundingAdapter for MockAdapter {
    fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    async fn load_markets(&self) -> Result<(), AdapterError> {
        self.calls.lock().load_markets += 1;

        {
            let mut remaining = self.load_failures.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AdapterError::Init {
                    exchange: self.exchange,
                    reason: "mock market load failure".to_string(),
                });
            }
        }

        *self.markets.write() = Markets::new(self.available.iter().cloned());
        Ok(())
    }

    fn contract_symbols(&self) -> Vec<String> {
        self.markets.read().contract_symbols()
    }

    fn supports_bulk_funding_rates(&self) -> bool {
        self.bulk.is_some()
    }

    async fn fetch_bulk_funding_rates(
        &self,
        symbols: Option<&[String]>,
    ) -> Result<FnvHashMap<String, FundingObservation>, AdapterError> {
        self.calls.lock().bulk += 1;

        let observations = match &self.bulk {
            Some(bulk) => bulk.clone()?,
            None => {
                return Err(AdapterError::Unsupported {
                    exchange: self.exchange,
                    operation: "fetch_bulk_funding_rates",
                });
            }
        };

        Ok(observations
            .into_iter()
            .filter(|observation| {
                symbols.is_none_or(|wanted| wanted.contains(&observation.symbol))
            })
            .map(|observation| (observation.symbol.clone(), observation))
            .collect())
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingObservation, AdapterError> {
        self.calls.lock().single += 1;

        self.rates
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| {
                Err(AdapterError::UnknownSymbol {
                    exchange: self.exchange,
                    symbol: symbol.to_string(),
                })
            })
    }

    async fn fetch_funding_rate_history(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<FundingObservation>, AdapterError> {
        self.calls.lock().history += 1;

        match self.history.get(symbol).cloned() {
            Some(history) => Ok(history?
                .into_iter()
                .filter(|entry| entry.time.is_none_or(|time| time >= since))
                .collect()),
            None => Ok(Vec::new()),
        }
    }
}
