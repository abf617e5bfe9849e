use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::geo::Coordinate;
use crate::geocode::{GeocodeError, GeocodeResult};
use crate::query::{LocationQuery, LocationResolver, ProximityEngine, SearchOutcome, SearchRequest};
use crate::record::{AddressFragments, EntityRef, EntityStatus, GeoFields, GeoRecord};
use crate::server::AppState;
use crate::settings::Settings;
use crate::Error;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Query string of `/search`. Kept flat and textual: form fields arrive as
/// strings and blank ones must not fail the request.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub radius: Option<String>,
    pub entity_type: Option<String>,
}

impl SearchParams {
    fn into_request(self) -> SearchRequest {
        SearchRequest {
            location: LocationQuery {
                latitude: self.latitude,
                longitude: self.longitude,
                address: AddressFragments {
                    street: self.street,
                    city: self.city,
                    state: self.state,
                    zip: self.zip,
                    country: self.country,
                },
            },
            radius_km: self.radius.and_then(|r| r.trim().parse().ok()),
            entity_type: self.entity_type,
        }
    }
}

#[derive(Deserialize)]
pub struct GeocodeParams {
    pub q: String,
}

#[derive(Deserialize)]
pub struct ReverseParams {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Deserialize)]
pub struct EntityBody {
    pub entity_type: String,
    pub status: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn fail(status: StatusCode, error: impl ToString) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: error.to_string() }))
}

fn from_error(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        Error::Validation(_) => fail(StatusCode::BAD_REQUEST, e),
        _ => fail(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

fn from_geocode_error(e: GeocodeError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        GeocodeError::Timeout(_) => fail(StatusCode::GATEWAY_TIMEOUT, e),
        _ => fail(StatusCode::BAD_GATEWAY, e),
    }
}

async fn bounded<T>(limit: Duration, call: impl Future<Output = GeocodeResult<T>>) -> GeocodeResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(GeocodeError::Timeout(limit)))
}

fn written(ok: bool) -> ApiResult<Value> {
    if ok {
        Ok(Json(serde_json::json!({ "ok": true })))
    } else {
        Err(fail(StatusCode::INTERNAL_SERVER_ERROR, "write failed"))
    }
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<SearchOutcome> {
    let settings = Settings::load(&state.store);
    let resolver = LocationResolver::new(&state.store, state.geocoder.as_ref(), state.default_location)
        .with_timeout(state.geocode_timeout);
    let engine = ProximityEngine::new(&state.store, resolver).with_default_radius(settings.default_radius_km);

    Ok(Json(engine.search(&params.into_request()).await))
}

pub async fn get_record(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<GeoRecord> {
    state
        .store
        .get_record(id)
        .map(Json)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, format!("no geodata for entity {}", id)))
}

pub async fn put_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(fields): Json<GeoFields>,
) -> ApiResult<Value> {
    let ok = state.store.update_record(id, &fields).map_err(from_error)?;
    written(ok)
}

pub async fn delete_record(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<Value> {
    written(state.store.delete_record(id))
}

pub async fn put_entity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<EntityBody>,
) -> ApiResult<Value> {
    let status: EntityStatus = body.status.parse().map_err(from_error)?;
    let entity = EntityRef::new(id, body.entity_type, status).with_title(body.title);
    let ok = state.store.upsert_entity(&entity).map_err(from_error)?;
    written(ok)
}

pub async fn get_setting(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ApiResult<Value> {
    match state.store.get_setting_value(&name) {
        Ok(Some(value)) => Ok(Json(value)),
        Ok(None) => Err(fail(StatusCode::NOT_FOUND, format!("setting {} is not set", name))),
        Err(e) => Err(from_error(e)),
    }
}

pub async fn put_setting(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(value): Json<Value>,
) -> ApiResult<Value> {
    written(state.store.update_setting(&name, &value))
}

pub async fn geocode(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeocodeParams>,
) -> ApiResult<Coordinate> {
    let lookup = state.geocoder.forward_geocode(&params.q);
    match bounded(state.geocode_timeout, lookup).await {
        Ok(Some(c)) => Ok(Json(c)),
        Ok(None) => Err(fail(StatusCode::NOT_FOUND, "no match")),
        Err(e) => Err(from_geocode_error(e)),
    }
}

pub async fn reverse(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReverseParams>,
) -> ApiResult<crate::record::Address> {
    let at = Coordinate::new(params.lat, params.lon).map_err(from_error)?;
    match bounded(state.geocode_timeout, state.geocoder.reverse_geocode(at)).await {
        Ok(Some(address)) => Ok(Json(address)),
        Ok(None) => Err(fail(StatusCode::NOT_FOUND, "no address found")),
        Err(e) => Err(from_geocode_error(e)),
    }
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<crate::storage::DbStats> {
    state.store.stats().map(Json).map_err(from_error)
}
