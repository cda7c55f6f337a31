use self::model::{
    HyperliquidAsset, HyperliquidAssetCtx, HyperliquidFundingHistory, HyperliquidInfoRequest,
    HyperliquidMetaAndAssetCtxs,
};
use super::{
    ExchangeId, FundingAdapter, Market, MarketKind, MarketType, Markets,
    rest::{RestClient, RestConfig},
    unified_symbol,
};
use crate::{
    config::ExchangeConfig,
    error::AdapterError,
    observation::{FundingObservation, interval_label_from_hours},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Hyperliquid REST payload models.
pub mod model;

/// [`Hyperliquid`] REST server base url.
///
/// See docs: <https://hyperliquid.gitbook.io/hyperliquid-docs/for-developers/api/info-endpoint>
pub const BASE_URL_HYPERLIQUID: &str = "https://api.hyperliquid.xyz";

/// Every [`Hyperliquid`] market data query is a POST to this path.
pub const INFO_PATH: &str = "/info";

/// Info requests weigh 20 against a budget of 1200 per minute.
pub const REQUEST_SPACING_HYPERLIQUID: Duration = Duration::from_secs(1);

/// Hyperliquid perpetuals are quoted & settled in USDC.
const QUOTE: &str = "USDC";

/// Hyperliquid settles funding every hour.
const FUNDING_INTERVAL_HOURS: i64 = 1;

const HISTORY_PAGE_LIMIT: usize = 500;
const HISTORY_MAX_PAGES: usize = 4;

/// [`Hyperliquid`] USDC perpetual funding rate adapter.
///
/// A single `metaAndAssetCtxs` request returns the current funding rate of every perpetual, so
/// the per-symbol query is served from the same snapshot.
#[derive(Debug)]
pub struct Hyperliquid {
    client: RestClient,
    market_type: MarketType,
    markets: RwLock<Markets>,
}

impl Hyperliquid {
    pub fn new(config: &ExchangeConfig, rest: &RestConfig) -> Result<Self, AdapterError> {
        let spacing = config.rate_limit.then_some(REQUEST_SPACING_HYPERLIQUID);

        Ok(Self {
            client: RestClient::new(ExchangeId::Hyperliquid, BASE_URL_HYPERLIQUID, spacing, rest)?,
            market_type: config.market_type,
            markets: RwLock::new(Markets::default()),
        })
    }

    async fn meta_and_asset_ctxs(&self) -> Result<HyperliquidMetaAndAssetCtxs, AdapterError> {
        self.client
            .post(INFO_PATH, &HyperliquidInfoRequest::MetaAndAssetCtxs)
            .await
    }

    fn market(&self, symbol: &str) -> Result<Market, AdapterError> {
        self.markets
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownSymbol {
                exchange: ExchangeId::Hyperliquid,
                symbol: symbol.to_string(),
            })
    }

    fn to_market(&self, asset: &HyperliquidAsset) -> Option<Market> {
        if asset.is_delisted || self.market_type != MarketType::Linear {
            return None;
        }
        Some(
            Market::new(
                unified_symbol(&asset.name, QUOTE, QUOTE),
                asset.name.as_str(),
                MarketKind::Perpetual,
            )
            .with_interval(interval_label_from_hours(FUNDING_INTERVAL_HOURS)),
        )
    }

    fn observation(
        market: &Market,
        ctx: HyperliquidAssetCtx,
        time: DateTime<Utc>,
    ) -> FundingObservation {
        FundingObservation {
            exchange: ExchangeId::Hyperliquid,
            symbol: market.symbol.clone(),
            funding_rate: ctx.funding,
            time: Some(time),
            mark_price: ctx.mark_px,
            interval: interval_label_from_hours(FUNDING_INTERVAL_HOURS),
        }
    }
}

#[async_trait]
impl FundingAdapter for Hyperliquid {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Hyperliquid
    }

    async fn load_markets(&self) -> Result<(), AdapterError> {
        let snapshot = self
            .meta_and_asset_ctxs()
            .await
            .map_err(|error| AdapterError::Init {
                exchange: ExchangeId::Hyperliquid,
                reason: error.to_string(),
            })?;

        let markets = Markets::new(
            snapshot
                .0
                .universe
                .iter()
                .filter_map(|asset| self.to_market(asset)),
        );

        debug!(
            markets = markets.len(),
            market_type = %self.market_type,
            "Hyperliquid markets loaded"
        );
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
        let snapshot = self.meta_and_asset_ctxs().await?;
        let time = Utc::now();

        let markets = self.markets.read();
        Ok(snapshot
            .into_assets()
            .filter_map(|(asset, ctx)| {
                let market = markets.get_by_id(&asset.name)?;
                if symbols.is_some_and(|symbols| !symbols.contains(&market.symbol)) {
                    return None;
                }
                Some((market.symbol.clone(), Self::observation(market, ctx, time)))
            })
            .collect())
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingObservation, AdapterError> {
        let market = self.market(symbol)?;
        let snapshot = self.meta_and_asset_ctxs().await?;

        snapshot
            .into_assets()
            .find(|(asset, _)| asset.name == market.id.as_str())
            .map(|(_, ctx)| Self::observation(&market, ctx, Utc::now()))
            .ok_or_else(|| AdapterError::Parse {
                exchange: ExchangeId::Hyperliquid,
                reason: format!("metaAndAssetCtxs response missing {}", market.id),
            })
    }

    async fn fetch_funding_rate_history(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<FundingObservation>, AdapterError> {
        let market = self.market(symbol)?;

        let mut history = Vec::new();
        let mut start = since;

        // Hyperliquid pages oldest first from `startTime`, capped per response
        for _ in 0..HISTORY_MAX_PAGES {
            let request = HyperliquidInfoRequest::FundingHistory {
                coin: market.id.as_str(),
                start_time: start.timestamp_millis(),
            };
            let page = self
                .client
                .post::<_, Vec<HyperliquidFundingHistory>>(INFO_PATH, &request)
                .await?;

            let page_len = page.len();
            let newest = page.iter().map(|entry| entry.time).max();

            history.extend(
                page.into_iter()
                    .filter(|entry| entry.time >= since)
                    .map(|entry| FundingObservation {
                        exchange: ExchangeId::Hyperliquid,
                        symbol: market.symbol.clone(),
                        funding_rate: entry.funding_rate,
                        time: Some(entry.time),
                        mark_price: None,
                        interval: interval_label_from_hours(FUNDING_INTERVAL_HOURS),
                    }),
            );

            match newest {
                Some(newest) if page_len >= HISTORY_PAGE_LIMIT => {
                    start = newest + ChronoDuration::milliseconds(1);
                }
                _ => break,
            }
        }

        Ok(history)
    }
}
