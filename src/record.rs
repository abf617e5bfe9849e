//! Geodata records and the host content index
//!
//! A [`GeoRecord`] holds one entity's location and contact data. The entity
//! itself is owned by the host; [`EntityRef`] is the slice of it the proximity
//! query needs (type and publication status).

use crate::geo::{self, Coordinate};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Publication status of a host entity. Only `Publish` is visible to searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Publish,
    Draft,
    Pending,
    Private,
    Trash,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Publish => "publish",
            EntityStatus::Draft => "draft",
            EntityStatus::Pending => "pending",
            EntityStatus::Private => "private",
            EntityStatus::Trash => "trash",
        }
    }
}

impl FromStr for EntityStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "publish" | "published" | "public" => Ok(EntityStatus::Publish),
            "draft" => Ok(EntityStatus::Draft),
            "pending" => Ok(EntityStatus::Pending),
            "private" => Ok(EntityStatus::Private),
            "trash" | "trashed" => Ok(EntityStatus::Trash),
            _ => Err(Error::Validation(format!("Unknown entity status: {}", s))),
        }
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Host-supplied content index row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: i64,
    pub entity_type: String,
    pub status: EntityStatus,
    #[serde(default)]
    pub title: String,
}

impl EntityRef {
    pub fn new(id: i64, entity_type: impl Into<String>, status: EntityStatus) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            status,
            title: String::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Stored geodata for one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub entity_id: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl GeoRecord {
    /// Both coordinates, if the record has them
    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate { latitude, longitude }),
            _ => None,
        }
    }
}

/// Write payload for [`crate::storage::GeoStore::update_record`].
///
/// Every column is written; `None` stores NULL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoFields {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl GeoFields {
    pub fn at(coordinate: Coordinate) -> Self {
        Self {
            latitude: Some(coordinate.latitude),
            longitude: Some(coordinate.longitude),
            ..Self::default()
        }
    }

    /// Copy address parts into the empty address fields
    pub fn fill_address(&mut self, address: &Address) {
        fill(&mut self.street, &address.street);
        fill(&mut self.city, &address.city);
        fill(&mut self.state, &address.state);
        fill(&mut self.zip, &address.zip);
        fill(&mut self.country, &address.country);
    }

    /// Trim text fields, drop blanks and check coordinate ranges.
    ///
    /// A record may carry both coordinates or neither; one without the other
    /// is rejected.
    pub fn normalized(&self) -> Result<GeoFields> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                geo::validate_latitude(lat)?;
                geo::validate_longitude(lon)?;
            }
            (None, None) => {}
            (Some(_), None) => {
                return Err(Error::Validation("latitude given without longitude".into()));
            }
            (None, Some(_)) => {
                return Err(Error::Validation("longitude given without latitude".into()));
            }
        }

        Ok(GeoFields {
            latitude: self.latitude,
            longitude: self.longitude,
            street: clean(&self.street),
            city: clean(&self.city),
            state: clean(&self.state),
            zip: clean(&self.zip),
            country: clean(&self.country),
            website: clean(&self.website),
            email: clean(&self.email),
            phone: clean(&self.phone),
        })
    }
}

impl From<GeoRecord> for GeoFields {
    fn from(r: GeoRecord) -> Self {
        Self {
            latitude: r.latitude,
            longitude: r.longitude,
            street: r.street,
            city: r.city,
            state: r.state,
            zip: r.zip,
            country: r.country,
            website: r.website,
            email: r.email,
            phone: r.phone,
        }
    }
}

/// Structured address as returned by reverse geocoding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub display_name: Option<String>,
}

/// Partial address supplied by a searcher. Any field may be blank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressFragments {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

impl AddressFragments {
    /// Non-blank fragments with their geodata column names, in address order
    pub fn parts(&self) -> Vec<(&'static str, &str)> {
        [
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("zip", &self.zip),
            ("country", &self.country),
        ]
        .into_iter()
        .filter_map(|(column, value)| {
            let value = value.as_deref()?.trim();
            (!value.is_empty()).then_some((column, value))
        })
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.parts().is_empty()
    }

    /// Free-text geocoder query: the non-blank fragments joined by spaces
    pub fn query_text(&self) -> String {
        self.parts()
            .into_iter()
            .map(|(_, value)| value)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One row of a proximity search or browse listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityHit {
    pub entity_id: i64,
    pub title: String,
    pub entity_type: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Distance from the search center; absent for browse listings
    pub distance_km: Option<f64>,
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn fill(target: &mut Option<String>, source: &Option<String>) {
    if clean(target).is_none() {
        *target = clean(source);
    }
}
