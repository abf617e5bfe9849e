//! Location Resolver
//!
//! Turns whatever a searcher supplied into one coordinate.
//!
//! Resolution order:
//! 1. Explicit coordinates (both present, numeric, in range)
//! 2. Stored address match (substring match on existing geodata)
//! 3. Forward geocoding of the address fragments
//! 4. Configured default location
//!
//! A request with neither coordinates nor address fragments is a browse
//! request and resolves to [`Resolution::NotRequested`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geo::Coordinate;
use crate::geocode::Geocoder;
use crate::record::AddressFragments;
use crate::storage::GeoStore;

/// Upper bound on a single geocoder call made while resolving
pub const DEFAULT_GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);

/// How a resolved coordinate was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Explicit,
    StoredMatch,
    Geocoded,
    DefaultFallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Explicit => "explicit",
            Provenance::StoredMatch => "stored-match",
            Provenance::Geocoded => "geocoded",
            Provenance::DefaultFallback => "default-fallback",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub provenance: Provenance,
}

impl ResolvedLocation {
    fn new(coordinate: Coordinate, provenance: Provenance) -> Self {
        Self {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            provenance,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate { latitude: self.latitude, longitude: self.longitude }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Resolved(ResolvedLocation),
    /// Nothing to resolve; the caller should list everything instead
    NotRequested,
}

/// Raw location input. Coordinates stay text until resolution so that blank
/// or garbled form fields can be told apart from absent ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationQuery {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    #[serde(flatten)]
    pub address: AddressFragments,
}

impl LocationQuery {
    pub fn at(coordinate: Coordinate) -> Self {
        Self {
            latitude: Some(coordinate.latitude.to_string()),
            longitude: Some(coordinate.longitude.to_string()),
            address: AddressFragments::default(),
        }
    }

    pub fn address(address: AddressFragments) -> Self {
        Self { address, ..Self::default() }
    }

    /// Whether any coordinate text was supplied, usable or not
    fn has_coordinate_input(&self) -> bool {
        [&self.latitude, &self.longitude]
            .iter()
            .any(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

pub struct LocationResolver<'a> {
    store: &'a GeoStore,
    geocoder: &'a dyn Geocoder,
    default_location: Coordinate,
    timeout: Duration,
}

impl<'a> LocationResolver<'a> {
    pub fn new(store: &'a GeoStore, geocoder: &'a dyn Geocoder, default_location: Coordinate) -> Self {
        Self {
            store,
            geocoder,
            default_location,
            timeout: DEFAULT_GEOCODE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn default_location(&self) -> Coordinate {
        self.default_location
    }

    /// Resolve a query. Never fails: every dead end lands on the default
    /// location.
    pub async fn resolve(&self, query: &LocationQuery) -> Resolution {
        if let Some(c) = Coordinate::parse(query.latitude.as_deref(), query.longitude.as_deref()) {
            debug!(%c, "Using explicit coordinates");
            return Resolution::Resolved(ResolvedLocation::new(c, Provenance::Explicit));
        }

        if query.address.is_empty() {
            if !query.has_coordinate_input() {
                return Resolution::NotRequested;
            }
            warn!(
                latitude = ?query.latitude,
                longitude = ?query.longitude,
                "Unusable coordinates and no address; using default location"
            );
            return Resolution::Resolved(self.fallback());
        }

        if let Some(c) = self.store.find_by_address_fragment(&query.address) {
            debug!(%c, "Address matched stored geodata");
            return Resolution::Resolved(ResolvedLocation::new(c, Provenance::StoredMatch));
        }

        if let Some(c) = self.geocode(&query.address.query_text()).await {
            debug!(%c, provider = self.geocoder.name(), "Address geocoded");
            return Resolution::Resolved(ResolvedLocation::new(c, Provenance::Geocoded));
        }

        Resolution::Resolved(self.fallback())
    }

    fn fallback(&self) -> ResolvedLocation {
        ResolvedLocation::new(self.default_location, Provenance::DefaultFallback)
    }

    /// Forward geocode with the resolver's timeout. Faults count as no match.
    async fn geocode(&self, text: &str) -> Option<Coordinate> {
        let provider = self.geocoder.name();
        match tokio::time::timeout(self.timeout, self.geocoder.forward_geocode(text)).await {
            Ok(Ok(Some(c))) => match Coordinate::new(c.latitude, c.longitude) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(provider, error = %e, "Geocoder returned an invalid coordinate");
                    None
                }
            },
            Ok(Ok(None)) => {
                debug!(provider, query = text, "Geocoder found no match");
                None
            }
            Ok(Err(e)) => {
                warn!(provider, error = %e, "Geocoding failed; falling back");
                None
            }
            Err(_) => {
                warn!(provider, timeout = ?self.timeout, "Geocoding timed out; falling back");
                None
            }
        }
    }
}
