//! OpenStreetMap Nominatim provider (community endpoint, no key)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{non_empty, GeocodeError, GeocodeResult, Geocoder, RateLimiter};
use crate::geo::Coordinate;
use crate::record::Address;

pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client, base_url: &str, limiter: RateLimiter) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter,
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> GeocodeResult<Option<Value>> {
        if !self.limiter.try_acquire() {
            warn!(path, "Nominatim rate limit reached; skipping request");
            return Ok(None);
        }

        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }
        Ok(Some(response.json().await?))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    async fn forward_geocode(&self, query: &str) -> GeocodeResult<Option<Coordinate>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        debug!(query, "Nominatim search");
        let params = [
            ("q", query.to_string()),
            ("format", "json".to_string()),
            ("addressdetails", "1".to_string()),
            ("limit", "1".to_string()),
        ];
        match self.get("search", &params).await? {
            Some(body) => parse_search(body),
            None => Ok(None),
        }
    }

    async fn reverse_geocode(&self, at: Coordinate) -> GeocodeResult<Option<Address>> {
        debug!(%at, "Nominatim reverse");
        let params = [
            ("lat", at.latitude.to_string()),
            ("lon", at.longitude.to_string()),
            ("format", "json".to_string()),
            ("addressdetails", "1".to_string()),
        ];
        match self.get("reverse", &params).await? {
            Some(body) => parse_reverse(body),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Option<PlaceAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct PlaceAddress {
    house_number: Option<String>,
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    country: Option<String>,
}

impl Place {
    fn coordinate(&self) -> GeocodeResult<Coordinate> {
        let lat = self.lat.trim().parse::<f64>();
        let lon = self.lon.trim().parse::<f64>();
        match (lat, lon) {
            (Ok(lat), Ok(lon)) => Coordinate::new(lat, lon)
                .map_err(|e| GeocodeError::Malformed(e.to_string())),
            _ => Err(GeocodeError::Malformed(format!(
                "unparsable coordinates {:?}, {:?}",
                self.lat, self.lon
            ))),
        }
    }

    fn into_address(self) -> Address {
        let a = self.address.unwrap_or_default();
        let street = match (non_empty(a.house_number.as_deref()), non_empty(a.road.as_deref())) {
            (Some(number), Some(road)) => Some(format!("{} {}", number, road)),
            (None, road) => road,
            (Some(_), None) => None,
        };

        Address {
            street,
            city: a.city.or(a.town).or(a.village).or(a.hamlet),
            state: a.state,
            zip: a.postcode,
            country: a.country,
            display_name: self.display_name,
        }
    }
}

/// `/search` answers with an array; the first element is the best match
fn parse_search(body: Value) -> GeocodeResult<Option<Coordinate>> {
    let places: Vec<Place> = serde_json::from_value(body)?;
    places.first().map(Place::coordinate).transpose()
}

/// `/reverse` answers with one place, or `{"error": ...}` when nothing is there
fn parse_reverse(body: Value) -> GeocodeResult<Option<Address>> {
    if body.get("error").is_some() {
        return Ok(None);
    }
    let place: Place = serde_json::from_value(body)?;
    Ok(Some(place.into_address()))
}
