use axum::{
    routing::{get, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::geo::Coordinate;
use crate::geocode::Geocoder;
use crate::storage::GeoStore;

pub mod routes;

/// Server state
pub struct AppState {
    pub store: GeoStore,
    pub geocoder: Arc<dyn Geocoder>,
    pub default_location: Coordinate,
    pub geocode_timeout: std::time::Duration,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/search", get(routes::search))
        .route(
            "/records/{id}",
            get(routes::get_record).put(routes::put_record).delete(routes::delete_record),
        )
        .route("/entities/{id}", put(routes::put_entity))
        .route("/settings/{name}", get(routes::get_setting).put(routes::put_setting))
        .route("/geocode", get(routes::geocode))
        .route("/reverse", get(routes::reverse))
        .route("/stats", get(routes::get_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = router(Arc::new(state));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);
    println!("🌍 Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
