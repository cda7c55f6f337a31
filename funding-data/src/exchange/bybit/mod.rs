use self::model::{BybitFundingRate, BybitInstrument, BybitList, BybitResponse, BybitTicker};
use super::{
    ExchangeId, FundingAdapter, Market, MarketKind, MarketType, Markets,
    rest::{RestClient, RestConfig},
    unified_symbol,
};
use crate::{
    config::ExchangeConfig,
    error::AdapterError,
    observation::{DEFAULT_FUNDING_INTERVAL, FundingObservation, interval_label_from_minutes},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Bybit REST payload models.
pub mod model;

/// [`Bybit`] server base url.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/guide>
pub const BASE_URL_BYBIT: &str = "https://api.bybit.com";

/// Spacing applied between requests when rate limiting is enabled.
pub const REQUEST_SPACING_BYBIT: Duration = Duration::from_millis(20);

const INSTRUMENTS_PAGE_LIMIT: usize = 1000;
const INSTRUMENTS_MAX_PAGES: usize = 10;
const HISTORY_PAGE_LIMIT: usize = 200;
const HISTORY_MAX_PAGES: usize = 10;

/// [`Bybit`] V5 funding rate adapter.
#[derive(Debug)]
pub struct Bybit {
    client: RestClient,
    category: MarketType,
    markets: RwLock<Markets>,
}

impl Bybit {
    pub fn new(config: &ExchangeConfig, rest: &RestConfig) -> Result<Self, AdapterError> {
        let spacing = config.rate_limit.then_some(REQUEST_SPACING_BYBIT);

        Ok(Self {
            client: RestClient::new(ExchangeId::Bybit, BASE_URL_BYBIT, spacing, rest)?,
            category: config.market_type,
            markets: RwLock::new(Markets::default()),
        })
    }

    async fn get<T>(&self, path: &str, mut query: Vec<(&str, String)>) -> Result<(T, Option<DateTime<Utc>>), AdapterError>
    where
        T: DeserializeOwned,
    {
        query.insert(0, ("category", self.category.as_str().to_string()));
        let response = self.client.get::<BybitResponse>(path, &query).await?;
        let time = response.time;
        response.into_result().map(|result| (result, time))
    }

    fn market(&self, symbol: &str) -> Result<Market, AdapterError> {
        self.markets
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownSymbol {
                exchange: ExchangeId::Bybit,
                symbol: symbol.to_string(),
            })
    }

    async fn fetch_instruments(&self) -> Result<Vec<BybitInstrument>, AdapterError> {
        let mut instruments = Vec::new();
        let mut cursor = String::new();

        for _ in 0..INSTRUMENTS_MAX_PAGES {
            let mut query = vec![("limit", INSTRUMENTS_PAGE_LIMIT.to_string())];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.clone()));
            }

            let (page, _) = self
                .get::<BybitList<BybitInstrument>>("/v5/market/instruments-info", query)
                .await?;

            instruments.extend(page.list);
            if page.next_page_cursor.is_empty() {
                break;
            }
            cursor = page.next_page_cursor;
        }

        Ok(instruments)
    }

    fn observation(
        market: &Market,
        ticker: BybitTicker,
        time: Option<DateTime<Utc>>,
    ) -> FundingObservation {
        FundingObservation {
            exchange: ExchangeId::Bybit,
            symbol: market.symbol.clone(),
            funding_rate: ticker.funding_rate,
            time,
            mark_price: ticker.mark_price,
            interval: market
                .interval
                .clone()
                .unwrap_or_else(|| DEFAULT_FUNDING_INTERVAL.to_string()),
        }
    }
}

#[async_trait]
impl FundingAdapter for Bybit {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Bybit
    }

    async fn load_markets(&self) -> Result<(), AdapterError> {
        let instruments = self
            .fetch_instruments()
            .await
            .map_err(|error| AdapterError::Init {
                exchange: ExchangeId::Bybit,
                reason: error.to_string(),
            })?;

        let markets = Markets::new(
            instruments
                .into_iter()
                .filter(BybitInstrument::is_trading_perpetual)
                .map(|instrument| {
                    Market::new(
                        unified_symbol(
                            &instrument.base_coin,
                            &instrument.quote_coin,
                            &instrument.settle_coin,
                        ),
                        instrument.symbol.as_str(),
                        MarketKind::Perpetual,
                    )
                    .with_interval(interval_label_from_minutes(instrument.funding_interval))
                }),
        );

        debug!(markets = markets.len(), category = %self.category, "Bybit markets loaded");
        *self.markets.write() = markets;
        Ok(())
    }

    fn contract_symbols(&self) -> Vec<String> {
        self.markets.read().contract_symbols()
    }

    fn supports_bulk_funding_rates(&self) -> bool {
        true
    }

    async fn fetch_bulk_funding_rates(
        &self,
        symbols: Option<&[String]>,
    ) -> Result<FnvHashMap<String, FundingObservation>, AdapterError> {
        let (tickers, time) = self
            .get::<BybitList<BybitTicker>>("/v5/market/tickers", vec![])
            .await?;

        let markets = self.markets.read().clone();
        Ok(tickers
            .list
            .into_iter()
            .filter_map(|ticker| {
                let market = markets.get_by_id(&ticker.symbol)?;
                let wanted = symbols.is_none_or(|wanted| wanted.contains(&market.symbol));
                wanted.then(|| (market.symbol.clone(), Self::observation(market, ticker, time)))
            })
            .collect())
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingObservation, AdapterError> {
        let market = self.market(symbol)?;

        let (tickers, time) = self
            .get::<BybitList<BybitTicker>>(
                "/v5/market/tickers",
                vec![("symbol", market.id.to_string())],
            )
            .await?;

        tickers
            .list
            .into_iter()
            .find(|ticker| ticker.symbol == market.id.as_str())
            .map(|ticker| Self::observation(&market, ticker, time))
            .ok_or_else(|| AdapterError::Parse {
                exchange: ExchangeId::Bybit,
                reason: format!("tickers response missing {}", market.id),
            })
    }

    async fn fetch_funding_rate_history(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<FundingObservation>, AdapterError> {
        let market = self.market(symbol)?;
        let interval = market
            .interval
            .clone()
            .unwrap_or_else(|| DEFAULT_FUNDING_INTERVAL.to_string());

        let mut history = Vec::new();
        let mut end = Utc::now();

        // Bybit pages newest first, so walk backwards from now until `since` is covered
        for _ in 0..HISTORY_MAX_PAGES {
            let (page, _) = self
                .get::<BybitList<BybitFundingRate>>(
                    "/v5/market/funding/history",
                    vec![
                        ("symbol", market.id.to_string()),
                        ("startTime", since.timestamp_millis().to_string()),
                        ("endTime", end.timestamp_millis().to_string()),
                        ("limit", HISTORY_PAGE_LIMIT.to_string()),
                    ],
                )
                .await?;

            let page_len = page.list.len();
            let oldest = page.list.iter().map(|entry| entry.time).min();

            history.extend(page.list.into_iter().map(|entry| FundingObservation {
                exchange: ExchangeId::Bybit,
                symbol: market.symbol.clone(),
                funding_rate: entry.funding_rate,
                time: Some(entry.time),
                mark_price: None,
                interval: interval.clone(),
            }));

            match oldest {
                Some(oldest) if page_len >= HISTORY_PAGE_LIMIT && oldest > since => {
                    end = oldest - ChronoDuration::milliseconds(1);
                }
                _ => break,
            }
        }

        Ok(history)
    }
}
