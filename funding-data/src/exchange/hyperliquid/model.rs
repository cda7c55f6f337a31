use crate::de::{de_opt_str_decimal, de_u64_epoch_ms_as_datetime_utc};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// [`Hyperliquid`](super::Hyperliquid) `info` endpoint request body.
///
/// See docs: <https://hyperliquid.gitbook.io/hyperliquid-docs/for-developers/api/info-endpoint/perpetuals>
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HyperliquidInfoRequest<'a> {
    /// Perpetual universe together with the live context of every asset.
    MetaAndAssetCtxs,
    /// Funding history of one coin from `start_time` (epoch milliseconds) onwards.
    FundingHistory {
        coin: &'a str,
        #[serde(rename = "startTime")]
        start_time: i64,
    },
}

/// [`Hyperliquid`](super::Hyperliquid) `metaAndAssetCtxs` response: the perpetual universe and an
/// asset context per universe entry, in the same order.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct HyperliquidMetaAndAssetCtxs(pub HyperliquidMeta, pub Vec<HyperliquidAssetCtx>);

impl HyperliquidMetaAndAssetCtxs {
    /// Pair every universe asset with its context.
    pub fn into_assets(self) -> impl Iterator<Item = (HyperliquidAsset, HyperliquidAssetCtx)> {
        let Self(meta, contexts) = self;
        meta.universe.into_iter().zip(contexts)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct HyperliquidMeta {
    pub universe: Vec<HyperliquidAsset>,
}

/// [`Hyperliquid`](super::Hyperliquid) perpetual universe entry, eg/ "BTC".
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct HyperliquidAsset {
    pub name: String,
    #[serde(rename = "isDelisted", default)]
    pub is_delisted: bool,
}

/// [`Hyperliquid`](super::Hyperliquid) live asset context.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct HyperliquidAssetCtx {
    #[serde(default, deserialize_with = "de_opt_str_decimal")]
    pub funding: Option<Decimal>,
    #[serde(rename = "markPx", default, deserialize_with = "de_opt_str_decimal")]
    pub mark_px: Option<Decimal>,
}

/// [`Hyperliquid`](super::Hyperliquid) funding history entry.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct HyperliquidFundingHistory {
    pub coin: String,
    #[serde(rename = "fundingRate", default, deserialize_with = "de_opt_str_decimal")]
    pub funding_rate: Option<Decimal>,
    #[serde(deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    pub time: DateTime<Utc>,
}
