use self::model::{
    BinanceExchangeInfo, BinanceFundingInfo, BinanceFundingRate, BinancePremiumIndex, OneOrMany,
};
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
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Binance REST payload models.
pub mod model;

/// [`Binance`] USD-M futures base url.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/general-info>
pub const BASE_URL_BINANCE_USD_M: &str = "https://fapi.binance.com";

/// [`Binance`] COIN-M futures base url.
///
/// See docs: <https://developers.binance.com/docs/derivatives/coin-margined-futures/general-info>
pub const BASE_URL_BINANCE_COIN_M: &str = "https://dapi.binance.com";

/// Spacing applied between requests when rate limiting is enabled.
pub const REQUEST_SPACING_BINANCE: Duration = Duration::from_millis(50);

/// Maximum number of entries Binance returns per funding rate history page.
const HISTORY_PAGE_LIMIT: usize = 1000;

/// Upper bound on history pages fetched for a single symbol.
const HISTORY_MAX_PAGES: usize = 10;

/// [`Binance`] futures funding rate adapter.
#[derive(Debug)]
pub struct Binance {
    client: RestClient,
    market_type: MarketType,
    markets: RwLock<Markets>,
}

impl Binance {
    pub fn new(config: &ExchangeConfig, rest: &RestConfig) -> Result<Self, AdapterError> {
        let base_url = match config.market_type {
            MarketType::Linear => BASE_URL_BINANCE_USD_M,
            MarketType::Inverse => BASE_URL_BINANCE_COIN_M,
        };
        let spacing = config.rate_limit.then_some(REQUEST_SPACING_BINANCE);

        Ok(Self {
            client: RestClient::new(ExchangeId::Binance, base_url, spacing, rest)?,
            market_type: config.market_type,
            markets: RwLock::new(Markets::default()),
        })
    }

    fn path(&self, endpoint: &str) -> String {
        match self.market_type {
            MarketType::Linear => format!("/fapi/v1/{endpoint}"),
            MarketType::Inverse => format!("/dapi/v1/{endpoint}"),
        }
    }

    fn market(&self, symbol: &str) -> Result<Market, AdapterError> {
        self.markets
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownSymbol {
                exchange: ExchangeId::Binance,
                symbol: symbol.to_string(),
            })
    }

    /// Funding interval overrides, keyed by native symbol. Symbols absent from `fundingInfo` use
    /// the default interval.
    async fn fetch_funding_intervals(&self) -> FnvHashMap<String, String> {
        match self
            .client
            .get::<Vec<BinanceFundingInfo>>(&self.path("fundingInfo"), &[])
            .await
        {
            Ok(infos) => infos
                .into_iter()
                .map(|info| {
                    (
                        info.symbol,
                        interval_label_from_hours(info.funding_interval_hours),
                    )
                })
                .collect(),
            Err(error) => {
                debug!(%error, "Binance fundingInfo unavailable, using default intervals");
                FnvHashMap::default()
            }
        }
    }

    fn observation(market: &Market, index: BinancePremiumIndex) -> FundingObservation {
        FundingObservation {
            exchange: ExchangeId::Binance,
            symbol: market.symbol.clone(),
            funding_rate: index.last_funding_rate,
            time: index.time,
            mark_price: index.mark_price,
            interval: market
                .interval
                .clone()
                .unwrap_or_else(|| DEFAULT_FUNDING_INTERVAL.to_string()),
        }
    }
}

#[async_trait]
impl FundingAdapter for Binance {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    async fn load_markets(&self) -> Result<(), AdapterError> {
        let info = self
            .client
            .get::<BinanceExchangeInfo>(&self.path("exchangeInfo"), &[])
            .await
            .map_err(|error| AdapterError::Init {
                exchange: ExchangeId::Binance,
                reason: error.to_string(),
            })?;

        let intervals = self.fetch_funding_intervals().await;

        let markets = Markets::new(
            info.symbols
                .into_iter()
                .filter(|symbol| symbol.is_trading_perpetual())
                .map(|symbol| {
                    let market = Market::new(
                        unified_symbol(&symbol.base_asset, &symbol.quote_asset, &symbol.margin_asset),
                        symbol.symbol.as_str(),
                        MarketKind::Perpetual,
                    );
                    match intervals.get(&symbol.symbol) {
                        Some(interval) => market.with_interval(interval.clone()),
                        None => market,
                    }
                }),
        );

        debug!(markets = markets.len(), "Binance markets loaded");
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
        let indexes = self
            .client
            .get::<OneOrMany<BinancePremiumIndex>>(&self.path("premiumIndex"), &[])
            .await?
            .into_vec();

        let markets = self.markets.read().clone();
        Ok(indexes
            .into_iter()
            .filter_map(|index| {
                let market = markets.get_by_id(&index.symbol)?;
                let wanted = symbols.is_none_or(|wanted| wanted.contains(&market.symbol));
                wanted.then(|| (market.symbol.clone(), Self::observation(market, index)))
            })
            .collect())
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingObservation, AdapterError> {
        let market = self.market(symbol)?;

        self.client
            .get::<OneOrMany<BinancePremiumIndex>>(
                &self.path("premiumIndex"),
                &[("symbol", market.id.to_string())],
            )
            .await?
            .into_vec()
            .into_iter()
            .find(|index| index.symbol == market.id.as_str())
            .map(|index| Self::observation(&market, index))
            .ok_or_else(|| AdapterError::Parse {
                exchange: ExchangeId::Binance,
                reason: format!("premiumIndex response missing {}", market.id),
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
        let mut start = since;

        for _ in 0..HISTORY_MAX_PAGES {
            let page = self
                .client
                .get::<Vec<BinanceFundingRate>>(
                    &self.path("fundingRate"),
                    &[
                        ("symbol", market.id.to_string()),
                        ("startTime", start.timestamp_millis().to_string()),
                        ("limit", HISTORY_PAGE_LIMIT.to_string()),
                    ],
                )
                .await?;

            let page_len = page.len();
            let last_time = page.last().map(|entry| entry.funding_time);

            history.extend(page.into_iter().map(|entry| FundingObservation {
                exchange: ExchangeId::Binance,
                symbol: market.symbol.clone(),
                funding_rate: entry.funding_rate,
                time: Some(entry.funding_time),
                mark_price: entry.mark_price,
                interval: interval.clone(),
            }));

            match last_time {
                Some(last_time) if page_len >= HISTORY_PAGE_LIMIT => {
                    start = last_time + ChronoDuration::milliseconds(1);
                }
                _ => break,
            }
        }

        Ok(history)
    }
}
