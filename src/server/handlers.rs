use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::error::TrackError;
use crate::location::{format_coords, DeliveryLocation};
use crate::location::types::coords_in_range;

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub(super) struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

impl From<TrackError> for ApiError {
    fn from(err: TrackError) -> Self {
        let status = match err {
            TrackError::MissingPincode => StatusCode::BAD_REQUEST,
            TrackError::GeocodeNoMatch { .. } => StatusCode::NOT_FOUND,
            TrackError::GeocodeProviderError { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, err.to_string())
    }
}

// ─── GET /api/delivery-location ──────────────────────────────────

#[derive(Deserialize, Default)]
pub struct DeliveryLocationQuery {
    pub pincode: Option<String>,
    pub address: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLocationResponse {
    #[serde(flatten)]
    pub location: DeliveryLocation,
    pub formatted_coords: String,
}

pub async fn delivery_location(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DeliveryLocationQuery>,
) -> Result<Json<DeliveryLocationResponse>, ApiError> {
    let start = Instant::now();
    let pincode = params.pincode.as_deref().unwrap_or("");

    let location = state
        .reconciler
        .resolve(params.order_id.as_deref(), pincode, params.address.as_deref())
        .await?;

    tracing::info!(
        pincode,
        order_id = params.order_id.as_deref().unwrap_or("-"),
        source = %location.source,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "GET /api/delivery-location"
    );

    Ok(Json(DeliveryLocationResponse {
        formatted_coords: format_coords(location.latitude, location.longitude),
        location,
    }))
}

// ─── GET /api/reverse-geocode ────────────────────────────────────

#[derive(Deserialize)]
pub struct ReverseQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Serialize, Debug)]
pub struct ReverseResponse {
    pub address: String,
}

pub async fn reverse_geocode(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReverseQuery>,
) -> Result<Json<ReverseResponse>, ApiError> {
    let (Some(lat), Some(lng)) = (params.lat, params.lng) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Provide 'lat' and 'lng' parameters"));
    };
    if !coords_in_range(lat, lng) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid coordinates. Lat: -90..90, Lng: -180..180",
        ));
    }

    let address = state.resolver.reverse_geocode(lat, lng).await;
    tracing::debug!(lat, lng, found = !address.is_empty(), "GET /api/reverse-geocode");
    Ok(Json(ReverseResponse { address }))
}

// ─── GET /api/health ─────────────────────────────────────────────

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
