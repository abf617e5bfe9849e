//! Coordinates and great-circle distance
//!
//! Distances use the spherical law of cosines on a sphere of radius
//! [`EARTH_RADIUS_KM`]. The same function is registered as a SQL scalar
//! function so radius filtering runs inside the storage query.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite values
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        validate_latitude(latitude)?;
        validate_longitude(longitude)?;
        Ok(Self { latitude, longitude })
    }

    /// Parse a coordinate from raw text fields (form input, query strings).
    ///
    /// Returns `None` when either side is missing, blank, not a number or
    /// out of range.
    pub fn parse(latitude: Option<&str>, longitude: Option<&str>) -> Option<Self> {
        let lat = latitude?.trim().parse::<f64>().ok()?;
        let lon = longitude?.trim().parse::<f64>().ok()?;
        Self::new(lat, lon).ok()
    }

    /// Great-circle distance to another coordinate in kilometers
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        spherical_distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

pub fn validate_latitude(latitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::Validation(format!(
            "latitude {} is outside [-90, 90]",
            latitude
        )));
    }
    Ok(())
}

pub fn validate_longitude(longitude: f64) -> Result<()> {
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::Validation(format!(
            "longitude {} is outside [-180, 180]",
            longitude
        )));
    }
    Ok(())
}

/// Spherical law of cosines distance between `(lat0, lon0)` and `(lat, lon)`.
///
/// The cosine term is clamped to [-1, 1]; rounding can push it past 1 for
/// identical points, which would make `acos` return NaN.
pub fn spherical_distance_km(lat0: f64, lon0: f64, lat: f64, lon: f64) -> f64 {
    let (lat0_r, lat_r) = (lat0.to_radians(), lat.to_radians());
    let cos_angle = lat0_r.cos() * lat_r.cos() * (lon.to_radians() - lon0.to_radians()).cos()
        + lat0_r.sin() * lat_r.sin();

    EARTH_RADIUS_KM * cos_angle.clamp(-1.0, 1.0).acos()
}
