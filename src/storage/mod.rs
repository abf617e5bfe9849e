//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - settings(name, value, created_at, updated_at)
//! - geodata(entity_id, latitude, longitude, street, city, state, zip, country, website, email, phone)
//! - entities(id, entity_type, status, title)
//!
//! Reads go through an injected [`crate::cache::Cache`].

pub mod schema;
pub mod sqlite;

pub use sqlite::{DbStats, GeoStore, Setting};
