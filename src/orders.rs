//! Order service client: tracking history fetch and courier location push.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::http::{self, HttpClient, HttpError};
use crate::location::LocationRecord;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderServiceError {
    #[error(transparent)]
    Http(#[from] HttpError),
    /// Non-2xx answer; carries the service's `{error}` message when it sent one.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// `GET order-tracking/{orderId}` body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    #[serde(default)]
    pub delivery_location: Option<TrackedPoint>,
}

/// Coordinates are optional on the wire; a point is usable only when both are present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrackedPoint {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Wire shape of a pushed location record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub address: String,
    pub captured_at: String,
}

impl From<&LocationRecord> for LocationPayload {
    fn from(record: &LocationRecord) -> Self {
        let s = &record.sample;
        Self {
            lat: s.latitude,
            lng: s.longitude,
            accuracy: s.accuracy_meters,
            speed: s.speed_mps,
            heading: s.heading_degrees,
            address: record.resolved_address.clone(),
            captured_at: s.captured_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[async_trait]
pub trait OrderService: Send + Sync {
    async fn fetch_tracking(&self, order_id: &str) -> Result<TrackingSnapshot, OrderServiceError>;

    async fn push_location(&self, order_id: &str, record: &LocationRecord) -> Result<(), OrderServiceError>;
}

pub struct HttpOrderService {
    client: Arc<dyn HttpClient>,
    base_url: String,
}

impl HttpOrderService {
    pub fn new(client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn tracking_url(&self, order_id: &str) -> String {
        format!("{}/order-tracking/{}", self.base_url, http::urlencode(order_id))
    }

    fn location_url(&self, order_id: &str) -> String {
        format!("{}/order-location/{}", self.base_url, http::urlencode(order_id))
    }
}

fn rejection(status: u16, body: &str) -> OrderServiceError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| format!("HTTP {}", status));
    OrderServiceError::Rejected { status, message }
}

#[async_trait]
impl OrderService for HttpOrderService {
    async fn fetch_tracking(&self, order_id: &str) -> Result<TrackingSnapshot, OrderServiceError> {
        let response = http::get_async(&self.client, self.tracking_url(order_id)).await?;
        if !response.is_success() {
            return Err(rejection(response.status, &response.body));
        }
        serde_json::from_str(&response.body).map_err(|e| OrderServiceError::InvalidResponse(e.to_string()))
    }

    async fn push_location(&self, order_id: &str, record: &LocationRecord) -> Result<(), OrderServiceError> {
        let payload = LocationPayload::from(record);
        let response = http::put_json_async(&self.client, self.location_url(order_id), &payload).await?;
        if !response.is_success() {
            return Err(rejection(response.status, &response.body));
        }
        Ok(())
    }
}
