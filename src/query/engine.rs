//! Proximity query engine
//!
//! Provides high-level search operations:
//! - Radius search around a coordinate, nearest first
//! - Browse listing of every geotagged, published entity
//! - Resolve-then-query search from raw location input

use serde::{Deserialize, Serialize};
use tracing::info;

use super::resolver::{LocationQuery, LocationResolver, Provenance, Resolution};
use crate::geo::Coordinate;
use crate::record::ProximityHit;
use crate::storage::GeoStore;

/// Radius used when a request does not name one
pub const DEFAULT_RADIUS_KM: f64 = 10.0;

/// A search as received from a caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    #[serde(flatten)]
    pub location: LocationQuery,
    pub radius_km: Option<f64>,
    pub entity_type: Option<String>,
}

/// Search result with the center it was computed around
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub center: Coordinate,
    /// `None` for browse listings, which are not centred on a resolved point
    pub provenance: Option<Provenance>,
    pub radius_km: Option<f64>,
    pub hits: Vec<ProximityHit>,
}

/// Query engine for proximity operations
pub struct ProximityEngine<'a> {
    store: &'a GeoStore,
    resolver: LocationResolver<'a>,
    default_radius_km: f64,
}

impl<'a> ProximityEngine<'a> {
    pub fn new(store: &'a GeoStore, resolver: LocationResolver<'a>) -> Self {
        Self {
            store,
            resolver,
            default_radius_km: DEFAULT_RADIUS_KM,
        }
    }

    pub fn with_default_radius(mut self, radius_km: f64) -> Self {
        self.default_radius_km = radius_km;
        self
    }

    /// Published entities strictly within `radius_km` of `center`, nearest
    /// first. A radius of zero or less matches nothing.
    pub fn within_radius(&self, center: Coordinate, radius_km: f64, entity_type: Option<&str>) -> Vec<ProximityHit> {
        self.store.find_within_radius(center, radius_km, entity_type)
    }

    /// Every published entity with coordinates
    pub fn browse(&self, entity_type: Option<&str>) -> Vec<ProximityHit> {
        self.store.find_all_with_coordinates(entity_type)
    }

    /// Resolve the request's location, then run the radius search around it.
    /// A request with no location at all lists everything instead.
    pub async fn search(&self, request: &SearchRequest) -> SearchOutcome {
        let entity_type = request
            .entity_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match self.resolver.resolve(&request.location).await {
            Resolution::Resolved(location) => {
                let radius_km = request.radius_km.unwrap_or(self.default_radius_km);
                let center = location.coordinate();
                let hits = self.within_radius(center, radius_km, entity_type);
                info!(
                    %center,
                    provenance = %location.provenance,
                    radius_km,
                    hits = hits.len(),
                    "Proximity search"
                );
                SearchOutcome {
                    center,
                    provenance: Some(location.provenance),
                    radius_km: Some(radius_km),
                    hits,
                }
            }
            Resolution::NotRequested => {
                let hits = self.browse(entity_type);
                info!(hits = hits.len(), "Browse listing");
                SearchOutcome {
                    center: self.resolver.default_location(),
                    provenance: None,
                    radius_km: None,
                    hits,
                }
            }
        }
    }
}
