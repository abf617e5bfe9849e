//! Geocoding gateway
//!
//! Forward (address → coordinate) and reverse (coordinate → address) lookups
//! behind one [`Geocoder`] trait. The provider is picked once from the
//! `map_provider` setting; callers never branch on it.
//!
//! Contract: `Ok(None)` means "no match", `Err` means the call itself failed
//! (transport, HTTP status, undecodable body). Callers that only need a best
//! effort answer treat both the same.

pub mod google;
pub mod nominatim;
pub mod rate_limit;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::GeocoderConfig;
use crate::geo::Coordinate;
use crate::record::Address;
use crate::settings::{MapProvider, Settings};

pub use google::GoogleGeocoder;
pub use nominatim::NominatimGeocoder;
pub use rate_limit::RateLimiter;

pub type GeocodeResult<T> = std::result::Result<T, GeocodeError>;

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("provider rejected request: {0}")]
    Provider(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<serde_json::Error> for GeocodeError {
    fn from(e: serde_json::Error) -> Self {
        GeocodeError::Malformed(e.to_string())
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    async fn forward_geocode(&self, query: &str) -> GeocodeResult<Option<Coordinate>>;

    async fn reverse_geocode(&self, at: Coordinate) -> GeocodeResult<Option<Address>>;
}

/// Build the geocoder matching the configured map provider
pub fn from_settings(settings: &Settings, config: &GeocoderConfig) -> GeocodeResult<Arc<dyn Geocoder>> {
    let client = http_client(config)?;

    Ok(match settings.map_provider {
        MapProvider::Leaflet => Arc::new(NominatimGeocoder::new(
            client,
            &config.nominatim_url,
            RateLimiter::new(settings.rate_limit, std::time::Duration::from_secs(settings.rate_limit_secs)),
        )),
        MapProvider::GoogleMaps => Arc::new(GoogleGeocoder::new(
            client,
            &config.google_url,
            &settings.google_maps_api_key,
        )),
    })
}

/// Shared HTTP client; the timeout applies to every provider call
pub fn http_client(config: &GeocoderConfig) -> GeocodeResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(config.user_agent.clone())
        .build()?)
}

/// Non-empty trimmed text, or `None`
pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
