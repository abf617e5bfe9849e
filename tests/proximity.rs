use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use geotag::cache::MemoryCache;
use geotag::geocode::{GeocodeError, GeocodeResult, Geocoder};
use geotag::query::{LocationQuery, LocationResolver, ProximityEngine, Provenance, Resolution, SearchRequest};
use geotag::record::Address;
use geotag::{AddressFragments, Coordinate, EntityRef, EntityStatus, GeoFields, GeoStore};

const LONDON: Coordinate = Coordinate { latitude: 51.5074, longitude: -0.1278 };
const PARIS: Coordinate = Coordinate { latitude: 48.8566, longitude: 2.3522 };
const HOME: Coordinate = Coordinate { latitude: 51.45400691006, longitude: -0.1332313840429 };

/// Geocoder that knows a single place, or fails when told to
struct OnePlace {
    name: &'static str,
    at: Coordinate,
    broken: bool,
    calls: AtomicUsize,
}

impl OnePlace {
    fn new(name: &'static str, at: Coordinate) -> Self {
        Self { name, at, broken: false, calls: AtomicUsize::new(0) }
    }

    fn broken() -> Self {
        Self { broken: true, ..Self::new("nowhere", HOME) }
    }
}

#[async_trait]
impl Geocoder for OnePlace {
    fn name(&self) -> &'static str {
        "one-place"
    }

    async fn forward_geocode(&self, query: &str) -> GeocodeResult<Option<Coordinate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(GeocodeError::Status(503));
        }
        Ok(query.to_lowercase().contains(self.name).then_some(self.at))
    }

    async fn reverse_geocode(&self, _at: Coordinate) -> GeocodeResult<Option<Address>> {
        Ok(None)
    }
}

fn tag(store: &GeoStore, id: i64, title: &str, at: Coordinate, city: &str) {
    store
        .upsert_entity(&EntityRef::new(id, "post", EntityStatus::Publish).with_title(title))
        .unwrap();
    let mut fields = GeoFields::at(at);
    fields.city = Some(city.to_string());
    assert!(store.update_record(id, &fields).unwrap());
}

fn london_and_paris() -> GeoStore {
    let store = GeoStore::open_in_memory_with_cache(Arc::new(MemoryCache::new())).unwrap();
    tag(&store, 1, "London office", LONDON, "London");
    tag(&store, 2, "Paris office", PARIS, "Paris");
    store
}

#[tokio::test]
async fn test_london_paris_radius_boundaries() {
    let store = london_and_paris();
    let geocoder = OnePlace::broken();
    let engine = ProximityEngine::new(&store, LocationResolver::new(&store, &geocoder, HOME));

    let wide = engine
        .search(&SearchRequest {
            location: LocationQuery::at(LONDON),
            radius_km: Some(500.0),
            entity_type: Some("post".into()),
        })
        .await;
    assert_eq!(wide.provenance, Some(Provenance::Explicit));
    assert_eq!(wide.hits.iter().map(|h| h.entity_id).collect::<Vec<_>>(), vec![1, 2]);
    assert!(wide.hits[0].distance_km.unwrap() < 0.001);
    let paris_km = wide.hits[1].distance_km.unwrap();
    assert!((paris_km - 343.5).abs() < 1.0, "London-Paris came out at {}", paris_km);

    let narrow = engine
        .search(&SearchRequest {
            location: LocationQuery::at(LONDON),
            radius_km: Some(300.0),
            entity_type: None,
        })
        .await;
    assert_eq!(narrow.hits.iter().map(|h| h.entity_id).collect::<Vec<_>>(), vec![1]);
}

#[tokio::test]
async fn test_stored_match_wins_over_geocoder() {
    let store = london_and_paris();
    let geocoder = OnePlace::new("paris", LONDON);
    let resolver = LocationResolver::new(&store, &geocoder, HOME);

    let query = LocationQuery::address(AddressFragments { city: Some("par".into()), ..Default::default() });
    match resolver.resolve(&query).await {
        Resolution::Resolved(location) => {
            assert_eq!(location.provenance, Provenance::StoredMatch);
            assert_eq!(location.coordinate(), PARIS);
        }
        Resolution::NotRequested => panic!("address query must resolve"),
    }
    assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_address_is_geocoded_then_falls_back() {
    let store = london_and_paris();
    let berlin = Coordinate { latitude: 52.52, longitude: 13.405 };
    let geocoder = OnePlace::new("berlin", berlin);
    let resolver = LocationResolver::new(&store, &geocoder, HOME);

    let known = LocationQuery::address(AddressFragments { city: Some("Berlin".into()), ..Default::default() });
    assert_eq!(
        resolver.resolve(&known).await,
        Resolution::Resolved(geotag::query::ResolvedLocation {
            latitude: berlin.latitude,
            longitude: berlin.longitude,
            provenance: Provenance::Geocoded,
        })
    );

    let unknown = LocationQuery::address(AddressFragments { city: Some("Atlantis".into()), ..Default::default() });
    match resolver.resolve(&unknown).await {
        Resolution::Resolved(location) => {
            assert_eq!(location.provenance, Provenance::DefaultFallback);
            assert_eq!(location.coordinate(), HOME);
        }
        Resolution::NotRequested => panic!("address query must resolve"),
    }
}

#[tokio::test]
async fn test_geocoder_outage_still_searches_around_default() {
    let store = london_and_paris();
    let geocoder = OnePlace::broken();
    let engine = ProximityEngine::new(&store, LocationResolver::new(&store, &geocoder, HOME));

    let request = SearchRequest {
        location: LocationQuery::address(AddressFragments { zip: Some("SW2".into()), ..Default::default() }),
        radius_km: Some(20.0),
        entity_type: None,
    };
    let outcome = engine.search(&request).await;
    assert_eq!(outcome.provenance, Some(Provenance::DefaultFallback));
    assert_eq!(outcome.center, HOME);
    assert_eq!(outcome.hits.iter().map(|h| h.entity_id).collect::<Vec<_>>(), vec![1]);
    assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unpublishing_hides_entity() {
    let store = london_and_paris();
    let geocoder = OnePlace::broken();
    let engine = ProximityEngine::new(&store, LocationResolver::new(&store, &geocoder, HOME));

    store
        .upsert_entity(&EntityRef::new(2, "post", EntityStatus::Draft))
        .unwrap();

    let hits = engine.within_radius(LONDON, 500.0, None);
    assert_eq!(hits.iter().map(|h| h.entity_id).collect::<Vec<_>>(), vec![1]);
    assert_eq!(engine.browse(None).len(), 1);
}
