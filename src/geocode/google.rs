//! Google Maps Geocoding API provider (commercial, key required)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{GeocodeError, GeocodeResult, Geocoder};
use crate::geo::Coordinate;
use crate::record::Address;

pub struct GoogleGeocoder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(client: reqwest::Client, endpoint: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.trim().to_string(),
        }
    }

    async fn request(&self, mut query: Vec<(&str, String)>) -> GeocodeResult<Option<Value>> {
        // No key, no request: the endpoint would only answer REQUEST_DENIED
        if self.api_key.is_empty() {
            warn!("Google Maps API key is not set; skipping geocode");
            return Ok(None);
        }
        query.push(("key", self.api_key.clone()));

        let response = self.client.get(&self.endpoint).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }
        Ok(Some(response.json().await?))
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn forward_geocode(&self, query: &str) -> GeocodeResult<Option<Coordinate>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        debug!(query, "Google geocode");
        let Some(body) = self.request(vec![("address", query.to_string())]).await? else {
            return Ok(None);
        };
        match parse_response(body)? {
            Some(hit) => hit.geometry.location.coordinate().map(Some),
            None => Ok(None),
        }
    }

    async fn reverse_geocode(&self, at: Coordinate) -> GeocodeResult<Option<Address>> {
        debug!(%at, "Google reverse geocode");
        let latlng = format!("{},{}", at.latitude, at.longitude);
        match self.request(vec![("latlng", latlng)]).await? {
            Some(body) => Ok(parse_response(body)?.map(GeocodeHit::into_address)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeHit>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    #[serde(default)]
    formatted_address: Option<String>,
    geometry: Geometry,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl LatLng {
    fn coordinate(self) -> GeocodeResult<Coordinate> {
        Coordinate::new(self.lat, self.lng).map_err(|e| GeocodeError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

impl GeocodeHit {
    fn component(&self, kind: &str) -> Option<String> {
        self.address_components
            .iter()
            .find(|c| c.types.iter().any(|t| t == kind))
            .map(|c| c.long_name.clone())
    }

    fn into_address(self) -> Address {
        let street = match (self.component("street_number"), self.component("route")) {
            (Some(number), Some(route)) => Some(format!("{} {}", number, route)),
            (None, route) => route,
            (Some(_), None) => None,
        };

        Address {
            street,
            city: self.component("locality").or_else(|| self.component("postal_town")),
            state: self.component("administrative_area_level_1"),
            zip: self.component("postal_code"),
            country: self.component("country"),
            display_name: self.formatted_address,
        }
    }
}

/// First result of an `OK` response; `ZERO_RESULTS` is "no match", any other
/// status is a provider error.
fn parse_response(body: Value) -> GeocodeResult<Option<GeocodeHit>> {
    let response: GeocodeResponse = serde_json::from_value(body)?;
    match response.status.as_str() {
        "OK" => Ok(response.results.into_iter().next()),
        "ZERO_RESULTS" => Ok(None),
        other => Err(GeocodeError::Provider(match response.error_message {
            Some(message) => format!("{}: {}", other, message),
            None => other.to_string(),
        })),
    }
}
