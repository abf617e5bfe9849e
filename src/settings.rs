//! Named settings read through [`GeoStore::get_setting`]
//!
//! Settings live in the `settings` table. Absent names resolve to the
//! defaults below, never to an error.

use crate::storage::GeoStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const MAP_PROVIDER: &str = "map_provider";
pub const GOOGLE_MAPS_API_KEY: &str = "google_maps_api_key";
pub const DEFAULT_RADIUS: &str = "default_radius";
pub const DEFAULT_ZOOM: &str = "default_zoom";
pub const POPUP_TEMPLATE: &str = "popup_template";
pub const ENABLED_POST_TYPES: &str = "enabled_post_types";
pub const RATE_LIMIT: &str = "rate_limit";
pub const RATE_LIMIT_TIME: &str = "rate_limit_time";

/// Which map stack the site uses; it also picks the geocoding provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapProvider {
    #[default]
    Leaflet,
    GoogleMaps,
}

impl MapProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapProvider::Leaflet => "leaflet",
            MapProvider::GoogleMaps => "google_maps",
        }
    }
}

impl FromStr for MapProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "leaflet" | "osm" | "openstreetmap" => Ok(MapProvider::Leaflet),
            "google_maps" | "google" | "googlemaps" => Ok(MapProvider::GoogleMaps),
            _ => Err(Error::Validation(format!("Unknown map provider: {}", s))),
        }
    }
}

impl std::fmt::Display for MapProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of every known setting with defaults applied.
///
/// `default_zoom`, `popup_template` and `enabled_post_types` describe how a
/// host renders maps and which content it geotags. The store only keeps and
/// reports them; search and geocoding never read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub map_provider: MapProvider,
    pub google_maps_api_key: String,
    pub default_radius_km: f64,
    pub default_zoom: u8,
    pub popup_template: String,
    pub enabled_post_types: Vec<String>,
    /// Geocoder requests allowed per `rate_limit_secs`
    pub rate_limit: u32,
    pub rate_limit_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            map_provider: MapProvider::Leaflet,
            google_maps_api_key: String::new(),
            default_radius_km: 10.0,
            default_zoom: 13,
            popup_template: "template1".to_string(),
            enabled_post_types: vec!["post".to_string(), "page".to_string()],
            rate_limit: 10,
            rate_limit_secs: 10,
        }
    }
}

impl Settings {
    pub fn load(store: &GeoStore) -> Self {
        let d = Settings::default();
        let provider: String = store.get_setting(MAP_PROVIDER, d.map_provider.as_str().to_string());

        Self {
            map_provider: provider.parse().unwrap_or(d.map_provider),
            google_maps_api_key: store.get_setting(GOOGLE_MAPS_API_KEY, d.google_maps_api_key),
            default_radius_km: store.get_setting(DEFAULT_RADIUS, d.default_radius_km),
            default_zoom: store.get_setting(DEFAULT_ZOOM, d.default_zoom),
            popup_template: store.get_setting(POPUP_TEMPLATE, d.popup_template),
            enabled_post_types: store.get_setting(ENABLED_POST_TYPES, d.enabled_post_types),
            rate_limit: store.get_setting(RATE_LIMIT, d.rate_limit),
            rate_limit_secs: store.get_setting(RATE_LIMIT_TIME, d.rate_limit_secs),
        }
    }
}
