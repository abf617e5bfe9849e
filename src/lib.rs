//! # Geotag - geotagged content store and proximity search
//!
//! Geotag provides:
//! - SQLite-backed storage for settings and per-entity geodata, behind a
//!   read-through cache
//! - Forward and reverse geocoding through interchangeable providers
//! - Location resolution from explicit coordinates or partial addresses
//! - Great-circle proximity search over published, geotagged content

pub mod cache;
pub mod config;
pub mod geo;
pub mod geocode;
pub mod query;
pub mod record;
pub mod server;
pub mod settings;
pub mod storage;
pub mod ui;

// Re-exports for convenient access
pub use geo::Coordinate;
pub use record::{AddressFragments, EntityRef, EntityStatus, GeoFields, GeoRecord, ProximityHit};
pub use storage::GeoStore;

/// Result type alias for Geotag operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Geotag operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
