use self::model::{OkxFundingRate, OkxFundingRateHistory, OkxInstrument, OkxResponse};
use super::{
    ExchangeId, FundingAdapter, Market, MarketKind, MarketType, Markets,
    rest::{RestClient, RestConfig},
    unified_symbol,
};
use crate::{
    config::ExchangeConfig,
    error::AdapterError,
    observation::{DEFAULT_FUNDING_INTERVAL, FundingObservation, interval_label_from_hours},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// OKX REST payload models.
pub mod model;

/// [`Okx`] REST server base url.
///
/// See docs: <https://www.okx.com/docs-v5/en/#overview-production-trading-services>
pub const BASE_URL_OKX_REST: &str = "https://www.okx.com";

/// OKX public funding endpoints allow 20 requests per 2 seconds.
pub const REQUEST_SPACING_OKX: Duration = Duration::from_millis(100);

const HISTORY_PAGE_LIMIT: usize = 100;
const HISTORY_MAX_PAGES: usize = 10;

/// [`Okx`] perpetual swap funding rate adapter.
///
/// OKX offers no endpoint returning the funding rates of every swap at once, so this adapter has
/// no bulk capability and is always collected symbol by symbol.
#[derive(Debug)]
pub struct Okx {
    client: RestClient,
    market_type: MarketType,
    markets: RwLock<Markets>,
}

impl Okx {
    pub fn new(config: &ExchangeConfig, rest: &RestConfig) -> Result<Self, AdapterError> {
        let spacing = config.rate_limit.then_some(REQUEST_SPACING_OKX);

        Ok(Self {
            client: RestClient::new(ExchangeId::Okx, BASE_URL_OKX_REST, spacing, rest)?,
            market_type: config.market_type,
            markets: RwLock::new(Markets::default()),
        })
    }

    async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<T>, AdapterError>
    where
        T: DeserializeOwned,
    {
        self.client
            .get::<OkxResponse>(path, query)
            .await?
            .into_data()
    }

    fn market(&self, symbol: &str) -> Result<Market, AdapterError> {
        self.markets
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownSymbol {
                exchange: ExchangeId::Okx,
                symbol: symbol.to_string(),
            })
    }

    fn to_market(&self, instrument: &OkxInstrument) -> Option<Market> {
        if !instrument.is_live() || instrument.ct_type != self.market_type.as_str() {
            return None;
        }
        let (base, quote) = instrument.base_quote()?;
        Some(Market::new(
            unified_symbol(base, quote, &instrument.settle_ccy),
            instrument.inst_id.as_str(),
            MarketKind::Perpetual,
        ))
    }
}

#[async_trait]
impl FundingAdapter for Okx {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Okx
    }

    async fn load_markets(&self) -> Result<(), AdapterError> {
        let instruments = self
            .get::<OkxInstrument>(
                "/api/v5/public/instruments",
                &[("instType", "SWAP".to_string())],
            )
            .await
            .map_err(|error| AdapterError::Init {
                exchange: ExchangeId::Okx,
                reason: error.to_string(),
            })?;

        let markets = Markets::new(
            instruments
                .iter()
                .filter_map(|instrument| self.to_market(instrument)),
        );

        debug!(markets = markets.len(), market_type = %self.market_type, "OKX markets loaded");
        *self.markets.write() = markets;
        Ok(())
    }

    fn contract_symbols(&self) -> Vec<String> {
        self.markets.read().contract_symbols()
    }

    fn supports_bulk_funding_rates(&self) -> bool {
        false
    }

    async fn fetch_bulk_funding_rates(
        &self,
        _: Option<&[String]>,
    ) -> Result<FnvHashMap<String, FundingObservation>, AdapterError> {
        Err(AdapterError::Unsupported {
            exchange: ExchangeId::Okx,
            operation: "fetch_bulk_funding_rates",
        })
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingObservation, AdapterError> {
        let market = self.market(symbol)?;

        let rate = self
            .get::<OkxFundingRate>(
                "/api/v5/public/funding-rate",
                &[("instId", market.id.to_string())],
            )
            .await?
            .into_iter()
            .find(|rate| rate.inst_id == market.id.as_str())
            .ok_or_else(|| AdapterError::Parse {
                exchange: ExchangeId::Okx,
                reason: format!("funding-rate response missing {}", market.id),
            })?;

        Ok(FundingObservation {
            exchange: ExchangeId::Okx,
            symbol: market.symbol.clone(),
            funding_rate: rate.funding_rate,
            time: rate.ts,
            mark_price: None,
            interval: rate
                .interval_hours()
                .map(interval_label_from_hours)
                .unwrap_or_else(|| DEFAULT_FUNDING_INTERVAL.to_string()),
        })
    }

    async fn fetch_funding_rate_history(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<FundingObservation>, AdapterError> {
        let market = self.market(symbol)?;

        let mut history = Vec::new();
        let mut after: Option<DateTime<Utc>> = None;

        // OKX pages newest first, `after` requests records older than the provided timestamp
        for _ in 0..HISTORY_MAX_PAGES {
            let mut query = vec![
                ("instId", market.id.to_string()),
                ("limit", HISTORY_PAGE_LIMIT.to_string()),
            ];
            if let Some(after) = after {
                query.push(("after", after.timestamp_millis().to_string()));
            }

            let page = self
                .get::<OkxFundingRateHistory>("/api/v5/public/funding-rate-history", &query)
                .await?;

            let page_len = page.len();
            let oldest = page.iter().map(|entry| entry.funding_time).min();

            history.extend(
                page.into_iter()
                    .filter(|entry| entry.funding_time >= since)
                    .map(|entry| FundingObservation {
                        exchange: ExchangeId::Okx,
                        symbol: market.symbol.clone(),
                        funding_rate: entry.funding_rate,
                        time: Some(entry.funding_time),
                        mark_price: None,
                        interval: DEFAULT_FUNDING_INTERVAL.to_string(),
                    }),
            );

            match oldest {
                Some(oldest) if page_len >= HISTORY_PAGE_LIMIT && oldest > since => {
                    after = Some(oldest);
                }
                _ => break,
            }
        }

        Ok(history)
    }
}
