use super::ExchangeId;
use crate::error::AdapterError;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

/// Default per-request timeout so a hung exchange cannot stall a collection cycle.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client configuration shared by every REST adapter.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Timeout applied to every request, connection included.
    pub request_timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RestConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Minimal JSON-over-HTTP client for a single exchange.
///
/// When constructed with a request spacing, consecutive requests are delayed so that at most one
/// request is sent per spacing period.
#[derive(Debug)]
pub struct RestClient {
    exchange: ExchangeId,
    http: Client,
    base_url: String,
    spacing: Option<Duration>,
    last_request: Mutex<Option<Instant>>,
}

impl RestClient {
    pub fn new(
        exchange: ExchangeId,
        base_url: impl Into<String>,
        spacing: Option<Duration>,
        config: &RestConfig,
    ) -> Result<Self, AdapterError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| AdapterError::Init {
                exchange,
                reason: format!("failed to build HTTP client: {error}"),
            })?;

        Ok(Self {
            exchange,
            http,
            base_url: base_url.into(),
            spacing,
            last_request: Mutex::new(None),
        })
    }

    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    /// Send a GET request to `path` with the provided query and decode the JSON response body.
    pub async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, AdapterError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(exchange = %self.exchange, %url, ?query, "sending REST GET request");

        self.send(path, self.http.get(&url).query(query)).await
    }

    /// Send a POST request to `path` with a JSON body and decode the JSON response body.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, AdapterError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(exchange = %self.exchange, %url, "sending REST POST request");

        self.send(path, self.http.post(&url).json(body)).await
    }

    async fn send<T>(&self, path: &str, request: RequestBuilder) -> Result<T, AdapterError>
    where
        T: DeserializeOwned,
    {
        self.throttle().await;

        let response = request.send().await.map_err(|error| AdapterError::Network {
            exchange: self.exchange,
            reason: format!("{path} request failed: {error}"),
        })?;

        let status = response.status();
        if is_rate_limited(status) {
            return Err(AdapterError::RateLimit {
                exchange: self.exchange,
                reason: format!("{path} returned HTTP {status}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|error| AdapterError::Network {
                exchange: self.exchange,
                reason: format!("{path} body read failed: {error}"),
            })?;

        if !status.is_success() {
            return Err(AdapterError::Network {
                exchange: self.exchange,
                reason: format!("{path} returned HTTP {status}: {}", truncate(&body, 200)),
            });
        }

        serde_json::from_str(&body).map_err(|error| AdapterError::Parse {
            exchange: self.exchange,
            reason: format!("{path}: {error}"),
        })
    }

    async fn throttle(&self) {
        let Some(spacing) = self.spacing else {
            return;
        };

        let mut last_request = self.last_request.lock().await;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < spacing {
                tokio::time::sleep(spacing - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

fn is_rate_limited(status: StatusCode) -> bool {
    // Binance answers 418 once an IP keeps ignoring 429s
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT
}

fn truncate(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}
