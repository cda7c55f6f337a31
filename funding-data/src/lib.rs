#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Funding-Data
//! Perpetual futures funding rate aggregation across cryptocurrency exchanges.
//!
//! Each [`Pipeline`](pipeline::Pipeline) cycle:
//! * Collects live funding rates from every configured exchange via the
//!   [`FundingAdapter`](exchange::FundingAdapter) facade, preferring bulk requests and falling
//!   back to per-symbol requests.
//! * Fetches seven days of funding history per contract symbol and reduces it to 1, 2, 3, 5 & 7
//!   day rolling averages.
//! * Full outer joins history & live data keyed by (exchange, symbol).
//! * Atomically rewrites a plain `symbol` x exchange matrix and a combined table.
//!
//! Failures of a single symbol or exchange never abort a cycle.

/// Environment driven [`PipelineConfig`](config::PipelineConfig) & per-exchange configuration.
pub mod config;

/// Live funding rate collection with bulk to per-symbol fallback and per-exchange retry.
pub mod collector;

/// Serde deserialisation helpers for exchange payloads.
pub mod de;

/// All [`Error`](std::error::Error)s generated in Funding-Data.
pub mod error;

/// [`FundingAdapter`](exchange::FundingAdapter) facade and its exchange implementations.
pub mod exchange;

/// Multi-window rolling averages of funding rate history.
pub mod history;

/// Full outer join of history windows and live observations.
pub mod merge;

/// Normalised [`FundingObservation`](observation::FundingObservation) model.
pub mod observation;

/// Scheduled collect, merge & write cycle.
pub mod pipeline;

/// Delimited table rendering, atomic writes & the read-side query.
pub mod table;

pub use config::PipelineConfig;
pub use error::{AdapterError, PipelineError, TableError};
pub use pipeline::{CycleOutcome, Pipeline};
