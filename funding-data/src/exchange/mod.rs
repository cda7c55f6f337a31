use crate::{error::AdapterError, observation::FundingObservation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{fmt::Display, str::FromStr, sync::Arc};

/// [`Binance`](binance::Binance) USD-M & COIN-M futures REST adapter.
pub mod binance;

/// [`Bybit`](bybit::Bybit) V5 linear & inverse REST adapter.
pub mod bybit;

/// [`Hyperliquid`](hyperliquid::Hyperliquid) USDC perpetual REST adapter.
pub mod hyperliquid;

/// In-memory [`FundingAdapter`] with scripted responses.
#[cfg(test)]
pub mod mock;

/// [`Okx`](okx::Okx) V5 perpetual swap REST adapter.
pub mod okx;

/// Shared HTTP client used by every REST adapter.
pub mod rest;

/// Unique identifier for an exchange venue.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Binance,
    Bybit,
    Hyperliquid,
    Okx,
}

impl ExchangeId {
    pub const ALL: [ExchangeId; 4] = [
        ExchangeId::Binance,
        ExchangeId::Bybit,
        ExchangeId::Hyperliquid,
        ExchangeId::Okx,
    ];

    /// Return the &str representation of this [`ExchangeId`].
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::Bybit => "bybit",
            ExchangeId::Hyperliquid => "hyperliquid",
            ExchangeId::Okx => "okx",
        }
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        ExchangeId::ALL
            .into_iter()
            .find(|exchange| exchange.as_str().eq_ignore_ascii_case(input.trim()))
            .ok_or_else(|| format!("unknown exchange: {input}"))
    }
}

/// Contract family an adapter loads markets for.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    /// Contracts margined & settled in the quote currency (eg/ USDT).
    #[default]
    Linear,
    /// Contracts margined & settled in the base currency.
    Inverse,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Linear => "linear",
            MarketType::Inverse => "inverse",
        }
    }
}

impl Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Instrument kind of a loaded [`Market`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub enum MarketKind {
    Spot,
    Perpetual,
    Future,
}

impl MarketKind {
    /// Contract markets are any derivative instrument, spot markets excluded.
    pub fn is_contract(&self) -> bool {
        matches!(self, MarketKind::Perpetual | MarketKind::Future)
    }
}

/// Market metadata loaded by [`FundingAdapter::load_markets`].
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Market {
    /// Unified `BASE/QUOTE:SETTLE` symbol.
    pub symbol: String,
    /// Exchange native market identifier, eg/ "BTCUSDT" or "BTC-USDT-SWAP".
    pub id: SmolStr,
    pub kind: MarketKind,
    /// Funding interval label reported by the market metadata, if any.
    pub interval: Option<String>,
}

impl Market {
    pub fn new(symbol: impl Into<String>, id: impl Into<SmolStr>, kind: MarketKind) -> Self {
        Self {
            symbol: symbol.into(),
            id: id.into(),
            kind,
            interval: None,
        }
    }

    pub fn with_interval(self, interval: impl Into<String>) -> Self {
        Self {
            interval: Some(interval.into()),
            ..self
        }
    }
}

/// Build the unified `BASE/QUOTE:SETTLE` symbol for a contract market.
pub fn unified_symbol(base: &str, quote: &str, settle: &str) -> String {
    format!(
        "{}/{}:{}",
        base.to_uppercase(),
        quote.to_uppercase(),
        settle.to_uppercase()
    )
}

/// Markets loaded by an adapter, indexed by both unified symbol and native id.
#[derive(Clone, Debug, Default)]
pub struct Markets {
    by_symbol: FnvHashMap<String, Market>,
    by_id: FnvHashMap<SmolStr, String>,
}

impl Markets {
    pub fn new(markets: impl IntoIterator<Item = Market>) -> Self {
        let mut this = Self::default();
        for market in markets {
            this.insert(market);
        }
        this
    }

    pub fn insert(&mut self, market: Market) {
        self.by_id.insert(market.id.clone(), market.symbol.clone());
        self.by_symbol.insert(market.symbol.clone(), market);
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn get(&self, symbol: &str) -> Option<&Market> {
        self.by_symbol.get(symbol)
    }

    /// Find the [`Market`] with the provided exchange native id.
    pub fn get_by_id(&self, id: &str) -> Option<&Market> {
        self.by_id
            .get(id)
            .and_then(|symbol| self.by_symbol.get(symbol))
    }

    /// Unified symbols of every contract market, sorted lexicographically.
    pub fn contract_symbols(&self) -> Vec<String> {
        self.by_symbol
            .values()
            .filter(|market| market.kind.is_contract())
            .map(|market| market.symbol.clone())
            .sorted()
            .collect()
    }
}

/// Uniform, capability-checked access to one exchange's markets & funding rate endpoints.
///
/// [`FundingAdapter::load_markets`] must complete before any rate query. Implementations never
/// retry; retry policy belongs to the caller.
#[async_trait]
pub trait FundingAdapter: Send + Sync {
    /// [`ExchangeId`] of the venue this adapter talks to.
    fn exchange(&self) -> ExchangeId;

    /// Load (or reload) the exchange market metadata.
    async fn load_markets(&self) -> Result<(), AdapterError>;

    /// Unified symbols of all contract markets loaded, spot markets excluded.
    fn contract_symbols(&self) -> Vec<String>;

    /// Whether [`FundingAdapter::fetch_bulk_funding_rates`] may be called.
    fn supports_bulk_funding_rates(&self) -> bool;

    /// Fetch current funding rates for many symbols in a single request.
    ///
    /// When `symbols` is provided the result is restricted to those symbols.
    async fn fetch_bulk_funding_rates(
        &self,
        symbols: Option<&[String]>,
    ) -> Result<FnvHashMap<String, FundingObservation>, AdapterError>;

    /// Fetch the current funding rate of a single symbol.
    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingObservation, AdapterError>;

    /// Fetch the funding rate history of a symbol since the provided instant (may be empty).
    async fn fetch_funding_rate_history(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<FundingObservation>, AdapterError>;
}

/// Construct the REST [`FundingAdapter`] for the provided exchange configuration.
pub fn build_adapter(
    config: &crate::config::ExchangeConfig,
    rest: &rest::RestConfig,
) -> Result<Arc<dyn FundingAdapter>, AdapterError> {
    let adapter: Arc<dyn FundingAdapter> = match config.exchange {
        ExchangeId::Binance => Arc::new(binance::Binance::new(config, rest)?),
        ExchangeId::Bybit => Arc::new(bybit::Bybit::new(config, rest)?),
        ExchangeId::Hyperliquid => Arc::new(hyperliquid::Hyperliquid::new(config, rest)?),
        ExchangeId::Okx => Arc::new(okx::Okx::new(config, rest)?),
    };
    Ok(adapter)
}
