//! Address resolution client
//!
//! Wraps the external address-resolution provider behind the
//! [`AddressResolver`] trait so the migration engine can be driven by an
//! in-memory fake in tests. The HTTP client enforces a per-request timeout
//! and a minimum interval between requests.
//!
//! Failure taxonomy:
//! - An unresolvable address is a *value* ([`Resolution::Unresolved`]),
//!   never an error.
//! - [`ResolveError`] carries the infrastructure failures; only the
//!   transient ones ([`ResolveError::is_transient`]) are worth retrying.

use async_trait::async_trait;
use drover_common::config::ResolverConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Resolver client errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ResolveError {
    /// True for failures where a retry can reasonably succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ResolveError::Network(_) | ResolveError::Timeout | ResolveError::RateLimited => true,
            ResolveError::Api(status, _) => *status >= 500,
            ResolveError::Parse(_) => false,
        }
    }
}

/// Geocoding precision reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Rooftop,
    Interpolated,
    Street,
    Locality,
    #[serde(other)]
    Unknown,
}

/// Structured resolution result for one raw address
///
/// Ephemeral: produced per resolution attempt and serialized verbatim into
/// the order's `address_snapshot` column; never stored as its own row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub formatted: String,
    pub street: String,
    pub house_number: String,
    pub city: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2
    pub country_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub precision: Precision,
}

/// Outcome of a resolution attempt that reached the provider
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The provider matched the input to a structured address
    Match(ResolvedAddress),
    /// The provider answered, but the input maps to no real address
    Unresolved,
}

/// External resolver boundary
///
/// Implementations must be side-effect free on repeated calls with identical
/// input, and deterministic absent transient conditions (resolution output
/// feeds the content hash).
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, raw_address: &str) -> Result<Resolution, ResolveError>;
}

/// Rate limiter enforcing a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with the rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Wire format: top-level response
#[derive(Debug, Deserialize)]
struct ApiResponse {
    results: Vec<ApiResult>,
}

/// Wire format: one candidate match
#[derive(Debug, Deserialize)]
struct ApiResult {
    formatted: String,
    components: ApiComponents,
    location: ApiLocation,
    precision: Precision,
}

#[derive(Debug, Deserialize)]
struct ApiComponents {
    street: String,
    house_number: String,
    city: String,
    postal_code: String,
    country_code: String,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    lat: f64,
    lon: f64,
}

impl From<ApiResult> for ResolvedAddress {
    fn from(r: ApiResult) -> Self {
        Self {
            formatted: r.formatted,
            street: r.components.street,
            house_number: r.components.house_number,
            city: r.components.city,
            postal_code: r.components.postal_code,
            country_code: r.components.country_code,
            latitude: r.location.lat,
            longitude: r.location.lon,
            precision: r.precision,
        }
    }
}

const USER_AGENT: &str = "drover-am/0.1.0 (+https://drover.dev)";

/// HTTP client for the address-resolution service
pub struct HttpAddressResolver {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: Arc<RateLimiter>,
}

impl HttpAddressResolver {
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolveError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ResolveError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            rate_limiter: Arc::new(RateLimiter::new(config.min_interval_ms)),
        })
    }
}

#[async_trait]
impl AddressResolver for HttpAddressResolver {
    async fn resolve(&self, raw_address: &str) -> Result<Resolution, ResolveError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/v1/resolve", self.base_url);
        let mut request = self
            .http_client
            .get(&url)
            .query(&[("q", raw_address), ("limit", "1")]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        tracing::debug!(raw = %raw_address, "Querying address resolver");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ResolveError::Timeout
            } else {
                ResolveError::Network(e.to_string())
            }
        })?;

        let status = response.status();

        if status == 429 {
            return Err(ResolveError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ResolveError::Api(status.as_u16(), error_text));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Parse(e.to_string()))?;

        match parsed.results.into_iter().next() {
            Some(result) => {
                let address = ResolvedAddress::from(result);
                tracing::debug!(
                    raw = %raw_address,
                    formatted = %address.formatted,
                    country = %address.country_code,
                    "Address resolved"
                );
                Ok(Resolution::Match(address))
            }
            None => {
                tracing::debug!(raw = %raw_address, "Address unresolvable");
                Ok(Resolution::Unresolved)
            }
        }
    }
}
