mod handlers;
mod state;

use axum::http::{header, HeaderValue};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

pub use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/delivery-location", get(handlers::delivery_location))
        .route("/api/reverse-geocode", get(handlers::reverse_geocode))
        .route("/api/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

pub async fn start(state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(%addr, error = %e, "Cannot bind");
        e
    })?;

    tracing::info!("Courier beacon API listening on http://{}", addr);
    axum::serve(listener, app).await
}
