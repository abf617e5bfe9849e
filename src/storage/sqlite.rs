//! SQLite storage implementation

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, ToSql};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::schema;
use crate::cache::{Cache, CacheKey, MemoryCache};
use crate::geo::{self, Coordinate};
use crate::record::{AddressFragments, EntityRef, EntityStatus, GeoFields, GeoRecord, ProximityHit};
use crate::{Error, Result};

/// SQLite-backed store for settings and per-entity geodata.
///
/// Public read and write operations never surface storage faults: reads fall
/// back to "absent" and writes report `false`, with the fault logged. Only
/// validation failures on write payloads are returned as errors.
///
/// Cache reads, fills and invalidations all happen under the connection lock,
/// and the cache is dropped whenever another connection has committed to the
/// same database file.
pub struct GeoStore {
    conn: Mutex<Connection>,
    cache: Arc<dyn Cache>,
    /// `PRAGMA data_version` as of the last cache check
    data_version: AtomicI64,
}

impl GeoStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_cache(path, Arc::new(MemoryCache::new()))
    }

    pub fn open_with_cache(path: &Path, cache: Arc<dyn Cache>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn, cache)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_cache(Arc::new(MemoryCache::new()))
    }

    pub fn open_in_memory_with_cache(cache: Arc<dyn Cache>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, cache)
    }

    fn from_connection(conn: Connection, cache: Arc<dyn Cache>) -> Result<Self> {
        register_functions(&conn)?;
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        let data_version = read_data_version(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache,
            data_version: AtomicI64::new(data_version),
        })
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every cached entry if another connection committed since the
    /// last check. Must be called with the connection lock held.
    fn sync_cache(&self, conn: &Connection) {
        match read_data_version(conn) {
            Ok(version) => {
                if self.data_version.swap(version, Ordering::Relaxed) != version {
                    debug!(version, "Database changed by another connection; clearing cache");
                    self.cache.clear();
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not read data_version; clearing cache");
                self.cache.clear();
            }
        }
    }

    /// Existence check through the cache. Both hits and misses are cached;
    /// writers invalidate the key afterwards.
    fn cached_exists(&self, conn: &Connection, key: CacheKey, sql: &str, param: &dyn ToSql) -> Result<bool> {
        self.sync_cache(conn);
        if let Some(exists) = self.cache.get(&key).and_then(|v| v.as_bool()) {
            return Ok(exists);
        }
        let count: i64 = conn.query_row(sql, params![param], |row| row.get(0))?;
        let exists = count > 0;
        self.cache.set(key, Value::Bool(exists));
        Ok(exists)
    }

    // ========== Setting Operations ==========

    /// Read a setting, falling back to `default` when it is absent, cannot be
    /// read, or does not deserialize into `T`.
    pub fn get_setting<T: DeserializeOwned>(&self, name: &str, default: T) -> T {
        match self.get_setting_value(name) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(setting = name, error = %e, "Stored setting has unexpected shape; using default");
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                error!(setting = name, error = %e, "Failed to read setting; using default");
                default
            }
        }
    }

    /// Raw JSON value of a setting. Only hits are cached, so an absent
    /// setting is looked up again on every call.
    pub fn get_setting_value(&self, name: &str) -> Result<Option<Value>> {
        let key = CacheKey::Setting(name.to_string());
        let conn = self.conn();
        self.sync_cache(&conn);
        if let Some(value) = self.cache.get(&key) {
            debug!(%key, "cache hit");
            return Ok(Some(value));
        }

        let raw: Option<String> = conn
            .query_row("SELECT value FROM settings WHERE name = ?1", [name], |row| row.get(0))
            .optional()?;

        match raw {
            Some(text) => {
                let value: Value = serde_json::from_str(&text)?;
                self.cache.set(key, value.clone());
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Insert or overwrite a setting. Returns `false` if the write failed.
    pub fn update_setting<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> bool {
        let conn = self.conn();
        let result = self.write_setting(&conn, name, value);

        self.cache.invalidate(&CacheKey::SettingExists(name.to_string()));
        self.cache.invalidate(&CacheKey::Setting(name.to_string()));

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(setting = name, error = %e, "Failed to write setting");
                false
            }
        }
    }

    fn write_setting<T: Serialize + ?Sized>(&self, conn: &Connection, name: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        let exists = self.cached_exists(
            conn,
            CacheKey::SettingExists(name.to_string()),
            "SELECT COUNT(*) FROM settings WHERE name = ?1",
            &name,
        )?;

        let update = "UPDATE settings SET value = ?2, updated_at = CURRENT_TIMESTAMP WHERE name = ?1";
        if exists && conn.execute(update, params![name, text])? > 0 {
            return Ok(());
        }

        match conn.execute("INSERT INTO settings (name, value) VALUES (?1, ?2)", params![name, text]) {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                debug!(setting = name, "Setting inserted concurrently; updating instead");
                conn.execute(update, params![name, text])?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All settings ordered by name
    pub fn list_settings(&self) -> Result<Vec<Setting>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT name, value, created_at, updated_at FROM settings ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            let text: String = row.get(1)?;
            let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
            Ok(Setting {
                name: row.get(0)?,
                value,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========== Geodata Operations ==========

    /// Geodata for an entity, read through the cache.
    pub fn get_record(&self, entity_id: i64) -> Option<GeoRecord> {
        match self.load_record(entity_id) {
            Ok(record) => record,
            Err(e) => {
                error!(entity_id, error = %e, "Failed to read geodata");
                None
            }
        }
    }

    fn load_record(&self, entity_id: i64) -> Result<Option<GeoRecord>> {
        let key = CacheKey::Record(entity_id);
        let conn = self.conn();
        self.sync_cache(&conn);
        if let Some(value) = self.cache.get(&key) {
            match serde_json::from_value::<GeoRecord>(value) {
                Ok(record) => {
                    debug!(%key, "cache hit");
                    return Ok(Some(record));
                }
                Err(_) => self.cache.invalidate(&key),
            }
        }

        let record = conn
            .query_row(
                &format!("SELECT {} FROM geodata WHERE entity_id = ?1", schema::GEODATA_COLUMNS),
                [entity_id],
                row_to_record,
            )
            .optional()?;

        if let Some(ref record) = record {
            self.cache.set(key, serde_json::to_value(record)?);
        }
        Ok(record)
    }

    /// Upsert the geodata row for an entity.
    ///
    /// Validation failures are returned as [`Error::Validation`] before
    /// storage is touched. A failed write is logged and reported as
    /// `Ok(false)`.
    pub fn update_record(&self, entity_id: i64, fields: &GeoFields) -> Result<bool> {
        let fields = fields.normalized()?;
        let conn = self.conn();
        let result = self.write_record(&conn, entity_id, &fields);

        self.cache.invalidate(&CacheKey::RecordExists(entity_id));
        self.cache.invalidate(&CacheKey::Record(entity_id));

        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(entity_id, error = %e, "Failed to write geodata");
                Ok(false)
            }
        }
    }

    fn write_record(&self, conn: &Connection, entity_id: i64, f: &GeoFields) -> Result<()> {
        let exists = self.cached_exists(
            conn,
            CacheKey::RecordExists(entity_id),
            "SELECT COUNT(*) FROM geodata WHERE entity_id = ?1",
            &entity_id,
        )?;

        let values = params![
            entity_id, f.latitude, f.longitude, f.street, f.city, f.state,
            f.zip, f.country, f.website, f.email, f.phone,
        ];
        let update = r#"
            UPDATE geodata SET latitude = ?2, longitude = ?3, street = ?4, city = ?5, state = ?6,
                zip = ?7, country = ?8, website = ?9, email = ?10, phone = ?11
            WHERE entity_id = ?1
        "#;

        if exists && conn.execute(update, values)? > 0 {
            return Ok(());
        }

        let insert = format!(
            "INSERT INTO geodata ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            schema::GEODATA_COLUMNS
        );
        match conn.execute(&insert, values) {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                debug!(entity_id, "Geodata inserted concurrently; updating instead");
                conn.execute(update, values)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove an entity's geodata. Called by the host when the entity is destroyed.
    pub fn delete_record(&self, entity_id: i64) -> bool {
        let conn = self.conn();
        let result = conn.execute("DELETE FROM geodata WHERE entity_id = ?1", [entity_id]);

        self.cache.invalidate(&CacheKey::RecordExists(entity_id));
        self.cache.invalidate(&CacheKey::Record(entity_id));

        match result {
            Ok(_) => true,
            Err(e) => {
                error!(entity_id, error = %e, "Failed to delete geodata");
                false
            }
        }
    }

    // ========== Entity Index ==========

    /// Record the host's type and publication status for an entity
    pub fn upsert_entity(&self, entity: &EntityRef) -> Result<bool> {
        let entity_type = entity.entity_type.trim();
        if entity_type.is_empty() {
            return Err(Error::Validation("entity type must not be empty".into()));
        }

        let result = self.conn().execute(
            r#"
            INSERT INTO entities (id, entity_type, status, title) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET entity_type = excluded.entity_type,
                status = excluded.status, title = excluded.title
            "#,
            params![entity.id, entity_type, entity.status.as_str(), entity.title],
        );

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                error!(entity_id = entity.id, error = %e, "Failed to write entity");
                Ok(false)
            }
        }
    }

    // ========== Location Queries ==========

    /// Published entities strictly closer than `radius_km` to `center`,
    /// nearest first. Rows without both coordinates never match.
    pub fn find_within_radius(&self, center: Coordinate, radius_km: f64, entity_type: Option<&str>) -> Vec<ProximityHit> {
        if radius_km.is_nan() || radius_km <= 0.0 {
            return Vec::new();
        }

        match self.query_within_radius(center, radius_km, entity_type) {
            Ok(hits) => hits,
            Err(e) => {
                error!(%center, radius_km, error = %e, "Proximity query failed");
                Vec::new()
            }
        }
    }

    fn query_within_radius(&self, center: Coordinate, radius_km: f64, entity_type: Option<&str>) -> Result<Vec<ProximityHit>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT entity_id, title, entity_type, latitude, longitude, distance FROM (
                SELECT g.id AS row_id, g.entity_id, e.title, e.entity_type, g.latitude, g.longitude,
                       distance_km(?1, ?2, g.latitude, g.longitude) AS distance
                FROM geodata g
                INNER JOIN entities e ON e.id = g.entity_id
                WHERE e.status = ?3
                  AND (?4 IS NULL OR e.entity_type = ?4)
                  AND g.latitude IS NOT NULL
                  AND g.longitude IS NOT NULL
            )
            WHERE distance < ?5
            ORDER BY distance ASC, row_id ASC
            "#,
        )?;

        let hits = stmt.query_map(
            params![
                center.latitude,
                center.longitude,
                EntityStatus::Publish.as_str(),
                entity_type,
                radius_km,
            ],
            row_to_hit,
        )?;
        Ok(hits.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Coordinates of the first stored row whose address contains every
    /// supplied fragment. Lowest row id wins.
    ///
    /// Matching uses SQLite's `LIKE`, which folds case for ASCII letters only:
    /// "LONDON" finds "London" but "MÜNCHEN" does not find "München".
    pub fn find_by_address_fragment(&self, fragments: &AddressFragments) -> Option<Coordinate> {
        match self.query_address_fragment(fragments) {
            Ok(found) => found,
            Err(e) => {
                error!(error = %e, "Address lookup failed");
                None
            }
        }
    }

    fn query_address_fragment(&self, fragments: &AddressFragments) -> Result<Option<Coordinate>> {
        let parts = fragments.parts();
        if parts.is_empty() {
            return Ok(None);
        }

        let clauses: Vec<String> = parts
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} LIKE ?{} ESCAPE '\\'", column, i + 1))
            .collect();
        let patterns: Vec<String> = parts
            .iter()
            .map(|(_, value)| format!("%{}%", escape_like(value)))
            .collect();

        let sql = format!(
            "SELECT latitude, longitude FROM geodata \
             WHERE latitude IS NOT NULL AND longitude IS NOT NULL AND {} \
             ORDER BY id ASC LIMIT 1",
            clauses.join(" AND ")
        );

        let found: Option<(f64, f64)> = self
            .conn()
            .query_row(&sql, rusqlite::params_from_iter(patterns.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;

        Ok(found.and_then(|(lat, lon)| Coordinate::new(lat, lon).ok()))
    }

    /// Every published entity with both coordinates, in storage order
    pub fn find_all_with_coordinates(&self, entity_type: Option<&str>) -> Vec<ProximityHit> {
        match self.query_all_with_coordinates(entity_type) {
            Ok(hits) => hits,
            Err(e) => {
                error!(error = %e, "Geotagged listing failed");
                Vec::new()
            }
        }
    }

    fn query_all_with_coordinates(&self, entity_type: Option<&str>) -> Result<Vec<ProximityHit>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT g.entity_id, e.title, e.entity_type, g.latitude, g.longitude, NULL
            FROM geodata g
            INNER JOIN entities e ON e.id = g.entity_id
            WHERE e.status = ?1
              AND (?2 IS NULL OR e.entity_type = ?2)
              AND g.latitude IS NOT NULL
              AND g.longitude IS NOT NULL
            ORDER BY g.id ASC
            "#,
        )?;

        let hits = stmt.query_map(params![EntityStatus::Publish.as_str(), entity_type], row_to_hit)?;
        Ok(hits.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========== Maintenance ==========

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.conn();
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(DbStats {
            settings: count("SELECT COUNT(*) FROM settings")?,
            records: count("SELECT COUNT(*) FROM geodata")?,
            geotagged: count("SELECT COUNT(*) FROM geodata WHERE latitude IS NOT NULL AND longitude IS NOT NULL")?,
            entities: count("SELECT COUNT(*) FROM entities")?,
        })
    }
}

/// Register `distance_km(lat0, lon0, lat, lon)`; NULL in, NULL out.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "distance_km",
        4,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let lat0: Option<f64> = ctx.get(0)?;
            let lon0: Option<f64> = ctx.get(1)?;
            let lat: Option<f64> = ctx.get(2)?;
            let lon: Option<f64> = ctx.get(3)?;
            Ok(match (lat0, lon0, lat, lon) {
                (Some(lat0), Some(lon0), Some(lat), Some(lon)) => {
                    Some(geo::spherical_distance_km(lat0, lon0, lat, lon))
                }
                _ => None,
            })
        },
    )?;
    Ok(())
}

fn read_data_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

/// Escape LIKE wildcards so user input matches literally
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<GeoRecord> {
    Ok(GeoRecord {
        entity_id: row.get(0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        street: row.get(3)?,
        city: row.get(4)?,
        state: row.get(5)?,
        zip: row.get(6)?,
        country: row.get(7)?,
        website: row.get(8)?,
        email: row.get(9)?,
        phone: row.get(10)?,
    })
}

fn row_to_hit(row: &rusqlite::Row) -> rusqlite::Result<ProximityHit> {
    Ok(ProximityHit {
        entity_id: row.get(0)?,
        title: row.get(1)?,
        entity_type: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        distance_km: row.get(5)?,
    })
}

/// A stored setting row
#[derive(Debug, Clone, serde::Serialize)]
pub struct Setting {
    pub name: String,
    pub value: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub settings: usize,
    pub records: usize,
    pub geotagged: usize,
    pub entities: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Settings: {}", self.settings)?;
        writeln!(f, "  Geodata records: {}", self.records)?;
        writeln!(f, "  With coordinates: {}", self.geotagged)?;
        writeln!(f, "  Entities: {}", self.entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LONDON: Coordinate = Coordinate { latitude: 51.5074, longitude: -0.1278 };
    const PARIS: Coordinate = Coordinate { latitude: 48.8566, longitude: 2.3522 };

    fn publish(store: &GeoStore, id: i64, entity_type: &str) {
        let entity = EntityRef::new(id, entity_type, EntityStatus::Publish).with_title(format!("Entity {}", id));
        assert!(store.upsert_entity(&entity).unwrap());
    }

    fn tag(store: &GeoStore, id: i64, c: Coordinate) {
        assert!(store.update_record(id, &GeoFields::at(c)).unwrap());
    }

    #[test]
    fn test_missing_setting_returns_default_every_time() {
        let store = GeoStore::open_in_memory().unwrap();
        for _ in 0..3 {
            assert_eq!(store.get_setting("default_radius", 10u32), 10);
        }
        assert!(store.cache().get(&CacheKey::Setting("default_radius".into())).is_none());
    }

    #[test]
    fn test_setting_read_after_write() {
        let store = GeoStore::open_in_memory().unwrap();

        assert!(store.update_setting("map_provider", "leaflet"));
        assert_eq!(store.get_setting("map_provider", String::new()), "leaflet");

        assert!(store.update_setting("map_provider", "google_maps"));
        assert_eq!(store.get_setting("map_provider", String::new()), "google_maps");

        assert!(store.update_setting("enabled_post_types", &vec!["post", "event"]));
        let types: Vec<String> = store.get_setting("enabled_post_types", Vec::new());
        assert_eq!(types, vec!["post", "event"]);

        assert_eq!(store.stats().unwrap().settings, 2);
    }

    #[test]
    fn test_setting_with_wrong_shape_uses_default() {
        let store = GeoStore::open_in_memory().unwrap();
        assert!(store.update_setting("default_zoom", "not a number"));
        assert_eq!(store.get_setting("default_zoom", 13u32), 13);
    }

    #[test]
    fn test_stale_setting_existence_falls_back_to_insert() {
        let cache = Arc::new(MemoryCache::new());
        let store = GeoStore::open_in_memory_with_cache(cache.clone()).unwrap();

        cache.set(CacheKey::SettingExists("rate_limit".into()), json!(true));
        assert!(store.update_setting("rate_limit", &5));
        assert_eq!(store.get_setting("rate_limit", 0), 5);
    }

    #[test]
    fn test_record_round_trip() {
        let store = GeoStore::open_in_memory().unwrap();
        let fields = GeoFields {
            latitude: Some(-33.8688),
            longitude: Some(151.2093),
            city: Some("Sydney".into()),
            phone: Some("+61 2 0000 0000".into()),
            ..GeoFields::default()
        };

        assert!(store.update_record(42, &fields).unwrap());
        let record = store.get_record(42).unwrap();
        assert_eq!(record.latitude, Some(-33.8688));
        assert_eq!(record.longitude, Some(151.2093));
        assert_eq!(record.city.as_deref(), Some("Sydney"));
        assert_eq!(record.street, None);

        assert!(store.cache().get(&CacheKey::Record(42)).is_some());
        assert_eq!(store.get_record(42), Some(record));
    }

    #[test]
    fn test_record_update_invalidates_cache() {
        let store = GeoStore::open_in_memory().unwrap();
        tag(&store, 1, LONDON);
        assert_eq!(store.get_record(1).unwrap().coordinate(), Some(LONDON));

        tag(&store, 1, PARIS);
        assert_eq!(store.get_record(1).unwrap().coordinate(), Some(PARIS));
        assert_eq!(store.stats().unwrap().records, 1);
    }

    #[test]
    fn test_invalid_record_is_not_written() {
        let store = GeoStore::open_in_memory().unwrap();
        let fields = GeoFields { latitude: Some(120.0), longitude: Some(0.0), ..GeoFields::default() };

        assert!(matches!(store.update_record(5, &fields), Err(Error::Validation(_))));
        assert!(store.get_record(5).is_none());
    }

    #[test]
    fn test_lost_insert_race_becomes_update() {
        let cache = Arc::new(MemoryCache::new());
        let store = GeoStore::open_in_memory_with_cache(cache.clone()).unwrap();
        tag(&store, 9, LONDON);

        // Another writer's view: the row looked absent when it checked
        cache.set(CacheKey::RecordExists(9), json!(false));
        tag(&store, 9, PARIS);

        assert_eq!(store.get_record(9).unwrap().coordinate(), Some(PARIS));
        assert_eq!(store.stats().unwrap().records, 1);
    }

    #[test]
    fn test_delete_record() {
        let store = GeoStore::open_in_memory().unwrap();
        tag(&store, 3, LONDON);
        assert!(store.get_record(3).is_some());

        assert!(store.delete_record(3));
        assert!(store.get_record(3).is_none());
    }

    #[test]
    fn test_within_radius_orders_and_filters() {
        let store = GeoStore::open_in_memory().unwrap();
        publish(&store, 1, "post");
        publish(&store, 2, "post");
        tag(&store, 1, PARIS);
        tag(&store, 2, LONDON);

        let hits = store.find_within_radius(LONDON, 500.0, Some("post"));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entity_id, 2);
        assert!(hits[0].distance_km.unwrap() < 0.01);
        assert_eq!(hits[1].entity_id, 1);
        assert!((hits[1].distance_km.unwrap() - 343.5).abs() < 1.0);

        let hits = store.find_within_radius(LONDON, 300.0, Some("post"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, 2);
    }

    #[test]
    fn test_within_radius_excludes_unpublished_and_other_types() {
        let store = GeoStore::open_in_memory().unwrap();
        publish(&store, 1, "post");
        publish(&store, 2, "page");
        store.upsert_entity(&EntityRef::new(3, "post", EntityStatus::Draft)).unwrap();
        for id in 1..=3 {
            tag(&store, id, LONDON);
        }

        let ids: Vec<i64> = store.find_within_radius(LONDON, 10.0, Some("post")).iter().map(|h| h.entity_id).collect();
        assert_eq!(ids, vec![1]);

        let ids: Vec<i64> = store.find_within_radius(LONDON, 10.0, None).iter().map(|h| h.entity_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_within_radius_skips_rows_without_coordinates() {
        let store = GeoStore::open_in_memory().unwrap();
        publish(&store, 1, "post");
        let fields = GeoFields { city: Some("London".into()), ..GeoFields::default() };
        store.update_record(1, &fields).unwrap();

        assert!(store.find_within_radius(LONDON, 20_000.0, None).is_empty());
        assert!(store.find_all_with_coordinates(None).is_empty());
    }

    #[test]
    fn test_non_positive_radius_is_empty() {
        let store = GeoStore::open_in_memory().unwrap();
        publish(&store, 1, "post");
        tag(&store, 1, LONDON);

        assert!(store.find_within_radius(LONDON, 0.0, None).is_empty());
        assert!(store.find_within_radius(LONDON, -5.0, None).is_empty());
    }

    #[test]
    fn test_address_fragment_match() {
        let store = GeoStore::open_in_memory().unwrap();
        let mut first = GeoFields::at(LONDON);
        first.city = Some("London".into());
        first.country = Some("United Kingdom".into());
        store.update_record(1, &first).unwrap();

        let mut second = GeoFields::at(PARIS);
        second.city = Some("Londonderry".into());
        store.update_record(2, &second).unwrap();

        let query = AddressFragments { city: Some("LONDON".into()), ..Default::default() };
        assert_eq!(store.find_by_address_fragment(&query), Some(LONDON));

        let query = AddressFragments {
            city: Some("london".into()),
            country: Some("kingdom".into()),
            ..Default::default()
        };
        assert_eq!(store.find_by_address_fragment(&query), Some(LONDON));

        let query = AddressFragments { city: Some("derry".into()), ..Default::default() };
        assert_eq!(store.find_by_address_fragment(&query), Some(PARIS));

        let query = AddressFragments { city: Some("Berlin".into()), ..Default::default() };
        assert_eq!(store.find_by_address_fragment(&query), None);

        assert_eq!(store.find_by_address_fragment(&AddressFragments::default()), None);
    }

    #[test]
    fn test_address_fragment_wildcards_are_literal() {
        let store = GeoStore::open_in_memory().unwrap();
        let mut fields = GeoFields::at(LONDON);
        fields.zip = Some("SW1A 2AA".into());
        store.update_record(1, &fields).unwrap();

        let query = AddressFragments { zip: Some("%".into()), ..Default::default() };
        assert_eq!(store.find_by_address_fragment(&query), None);
        let query = AddressFragments { zip: Some("sw1a".into()), ..Default::default() };
        assert_eq!(store.find_by_address_fragment(&query), Some(LONDON));
    }

    /// Cache that lets a writer start while the store is filling a setting
    struct WriteDuringFill {
        inner: MemoryCache,
        store: std::sync::OnceLock<Arc<GeoStore>>,
        fired: std::sync::atomic::AtomicBool,
        writer: Mutex<Option<std::thread::JoinHandle<bool>>>,
    }

    impl Cache for WriteDuringFill {
        fn get(&self, key: &CacheKey) -> Option<Value> {
            self.inner.get(key)
        }

        fn set(&self, key: CacheKey, value: Value) {
            if matches!(key, CacheKey::Setting(_)) && !self.fired.swap(true, Ordering::SeqCst) {
                let store = Arc::clone(self.store.get().unwrap());
                let handle = std::thread::spawn(move || store.update_setting("map_provider", "google_maps"));
                *self.writer.lock().unwrap() = Some(handle);
                std::thread::sleep(Duration::from_millis(50));
            }
            self.inner.set(key, value);
        }

        fn invalidate(&self, key: &CacheKey) {
            self.inner.invalidate(key)
        }

        fn clear(&self) {
            self.inner.clear()
        }
    }

    #[test]
    fn test_write_during_cache_fill_is_not_lost() {
        let cache = Arc::new(WriteDuringFill {
            inner: MemoryCache::new(),
            store: std::sync::OnceLock::new(),
            fired: std::sync::atomic::AtomicBool::new(false),
            writer: Mutex::new(None),
        });
        let store = Arc::new(GeoStore::open_in_memory_with_cache(cache.clone()).unwrap());
        assert!(cache.store.set(Arc::clone(&store)).is_ok());

        assert!(store.update_setting("map_provider", "leaflet"));
        assert_eq!(store.get_setting("map_provider", String::new()), "leaflet");

        let writer = cache.writer.lock().unwrap().take().unwrap();
        assert!(writer.join().unwrap());
        assert_eq!(store.get_setting("map_provider", String::new()), "google_maps");
    }

    #[test]
    fn test_second_connection_writes_are_seen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geo.db");
        let server = GeoStore::open(&path).unwrap();
        let cli = GeoStore::open(&path).unwrap();

        assert!(cli.update_setting("default_radius", &10));
        assert_eq!(server.get_setting("default_radius", 0), 10);
        assert!(cli.update_setting("default_radius", &50));
        assert_eq!(server.get_setting("default_radius", 0), 50);

        assert!(cli.update_record(4, &GeoFields::at(LONDON)).unwrap());
        assert_eq!(server.get_record(4).unwrap().coordinate(), Some(LONDON));
        assert!(cli.update_record(4, &GeoFields::at(PARIS)).unwrap());
        assert_eq!(server.get_record(4).unwrap().coordinate(), Some(PARIS));

        assert!(cli.delete_record(4));
        assert!(server.get_record(4).is_none());
    }

    #[test]
    fn test_address_fragment_case_folding_is_ascii_only() {
        let store = GeoStore::open_in_memory().unwrap();
        let mut fields = GeoFields::at(LONDON);
        fields.city = Some("München".into());
        store.update_record(1, &fields).unwrap();

        let query = AddressFragments { city: Some("mÜnchen".into()), ..Default::default() };
        assert_eq!(store.find_by_address_fragment(&query), None);
        let query = AddressFragments { city: Some("MüNCHEN".into()), ..Default::default() };
        assert_eq!(store.find_by_address_fragment(&query), Some(LONDON));
    }

    #[test]
    fn test_concurrent_writers_leave_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geo.db");
        let first = GeoStore::open(&path).unwrap();
        let second = GeoStore::open(&path).unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..20 {
                    assert!(first.update_setting("popup_template", &format!("a{}", i)));
                    assert!(first.update_record(1, &GeoFields::at(LONDON)).unwrap());
                }
            });
            s.spawn(|| {
                for i in 0..20 {
                    assert!(second.update_setting("popup_template", &format!("b{}", i)));
                    assert!(second.update_record(1, &GeoFields::at(PARIS)).unwrap());
                }
            });
        });

        let stats = first.stats().unwrap();
        assert_eq!(stats.settings, 1);
        assert_eq!(stats.records, 1);
        let value: String = first.get_setting("popup_template", String::new());
        assert!(value == "a19" || value == "b19", "unexpected value {}", value);
    }
}
