//! Read-through cache used by [`crate::storage::GeoStore`]
//!
//! The cache is a pure performance layer. The store populates it on read hits
//! and invalidates the affected keys on every write, so an entry never
//! outlives an update to its row.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Keys the store caches under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Deserialized value of a setting
    Setting(String),
    /// Whether a settings row exists
    SettingExists(String),
    /// Geodata row for an entity
    Record(i64),
    /// Whether a geodata row exists for an entity
    RecordExists(i64),
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Setting(name) => write!(f, "setting:{}", name),
            CacheKey::SettingExists(name) => write!(f, "setting-exists:{}", name),
            CacheKey::Record(id) => write!(f, "record:{}", id),
            CacheKey::RecordExists(id) => write!(f, "record-exists:{}", id),
        }
    }
}

/// Cache backend injected into the store
pub trait Cache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Value>;
    fn set(&self, key: CacheKey, value: Value);
    fn invalidate(&self, key: &CacheKey);
    fn clear(&self);
}

/// In-process cache with an optional time-to-live.
pub struct MemoryCache {
    ttl: Option<Duration>,
    entries: RwLock<HashMap<CacheKey, (Instant, Value)>>,
}

impl MemoryCache {
    /// Entries never expire; they live until invalidated
    pub fn new() -> Self {
        Self { ttl: None, entries: RwLock::new(HashMap::new()) }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl), entries: RwLock::new(HashMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, stored_at: Instant) -> bool {
        self.ttl.is_some_and(|ttl| stored_at.elapsed() >= ttl)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Value> {
        {
            let guard = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match guard.get(key) {
                Some((stored_at, value)) if !self.is_expired(*stored_at) => return Some(value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it unless a fresh value landed in between
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if guard.get(key).is_some_and(|(stored_at, _)| self.is_expired(*stored_at)) {
            guard.remove(key);
        }
        None
    }

    fn set(&self, key: CacheKey, value: Value) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, (Instant::now(), value));
    }

    fn invalidate(&self, key: &CacheKey) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_invalidate() {
        let cache = MemoryCache::new();
        let key = CacheKey::Setting("map_provider".into());

        assert!(cache.get(&key).is_none());
        cache.set(key.clone(), json!("leaflet"));
        assert_eq!(cache.get(&key), Some(json!("leaflet")));

        cache.invalidate(&key);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_keys_are_distinct() {
        let cache = MemoryCache::new();
        cache.set(CacheKey::Record(7), json!({"entity_id": 7}));
        cache.set(CacheKey::RecordExists(7), json!(true));

        cache.invalidate(&CacheKey::Record(7));
        assert!(cache.get(&CacheKey::Record(7)).is_none());
        assert_eq!(cache.get(&CacheKey::RecordExists(7)), Some(json!(true)));
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = MemoryCache::with_ttl(Duration::ZERO);
        cache.set(CacheKey::Record(1), json!(1));
        assert!(cache.get(&CacheKey::Record(1)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = MemoryCache::new();
        cache.set(CacheKey::Record(1), json!(1));
        cache.set(CacheKey::Setting("a".into()), json!(2));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
