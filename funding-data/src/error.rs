use crate::exchange::ExchangeId;
use std::path::PathBuf;
use thiserror::Error;

/// All errors generated by an exchange [`FundingAdapter`](crate::exchange::FundingAdapter).
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum AdapterError {
    #[error("{exchange} failed to load markets: {reason}")]
    Init { exchange: ExchangeId, reason: String },

    #[error("{exchange} network error: {reason}")]
    Network { exchange: ExchangeId, reason: String },

    #[error("{exchange} rate limit exceeded: {reason}")]
    RateLimit { exchange: ExchangeId, reason: String },

    #[error("{exchange} does not support {operation}")]
    Unsupported {
        exchange: ExchangeId,
        operation: &'static str,
    },

    #[error("{exchange} has no contract market for symbol: {symbol}")]
    UnknownSymbol { exchange: ExchangeId, symbol: String },

    #[error("{exchange} payload could not be decoded: {reason}")]
    Parse { exchange: ExchangeId, reason: String },
}

impl AdapterError {
    /// [`ExchangeId`] of the adapter that generated this error.
    pub fn exchange(&self) -> ExchangeId {
        match self {
            AdapterError::Init { exchange, .. }
            | AdapterError::Network { exchange, .. }
            | AdapterError::RateLimit { exchange, .. }
            | AdapterError::Unsupported { exchange, .. }
            | AdapterError::UnknownSymbol { exchange, .. }
            | AdapterError::Parse { exchange, .. } => *exchange,
        }
    }

    /// Determine if the failed operation may succeed if attempted again.
    ///
    /// Unsupported operations are permanent for an exchange and must trigger a fallback path
    /// rather than a retry.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Init { .. }
            | AdapterError::Network { .. }
            | AdapterError::RateLimit { .. } => true,
            _ => false,
        }
    }
}

/// Errors generated while persisting or reading a funding table.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum TableError {
    #[error("table does not exist: {0}")]
    Missing(PathBuf),

    #[error("failed to access table {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("malformed table {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("failed to render table: {0}")]
    Render(String),
}

impl TableError {
    pub(crate) fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        let path = path.into();
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::Missing(path),
            _ => Self::Io {
                path,
                reason: error.to_string(),
            },
        }
    }
}

/// Cycle-fatal errors generated by a [`Pipeline`](crate::pipeline::Pipeline).
///
/// Per-exchange and per-symbol [`AdapterError`]s are contained by the collection stages and never
/// surface here.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum PipelineError {
    #[error("failed to write funding table: {0}")]
    Write(#[from] TableError),

    #[error("failed to initialise exchange adapter: {0}")]
    Adapter(#[from] AdapterError),
}
