//! Core types for the location subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a displayed delivery location came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationSource {
    /// Last position the order service stored for the courier.
    TrackingHistory,
    /// Centroid of the delivery pincode.
    GeocodedFallback,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrackingHistory => write!(f, "Tracking history"),
            Self::GeocodedFallback => write!(f, "Pincode geocode"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid position sample: {0}")]
pub struct InvalidSample(pub String);

/// One device position reading. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub heading_degrees: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Result<Self, InvalidSample> {
        if !coords_in_range(latitude, longitude) {
            return Err(InvalidSample(format!("coordinates out of range: {}, {}", latitude, longitude)));
        }
        if !(accuracy_meters >= 0.0) {
            return Err(InvalidSample(format!("accuracy must be >= 0, got {}", accuracy_meters)));
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy_meters,
            speed_mps: None,
            heading_degrees: None,
            captured_at: Utc::now(),
        })
    }

    pub fn with_motion(mut self, speed_mps: Option<f64>, heading_degrees: Option<f64>) -> Self {
        self.speed_mps = speed_mps;
        self.heading_degrees = heading_degrees;
        self
    }
}

/// A sample plus its reverse-geocoded address. The unit pushed to the order service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRecord {
    pub sample: PositionSample,
    /// Empty when reverse geocoding failed.
    pub resolved_address: String,
}

/// The location rendered on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub source: LocationSource,
}

/// First forward-geocoding hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeMatch {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

/// Geocoding errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeocodeError {
    #[error("no location found for '{0}'")]
    NoMatch(String),
    #[error("geocoding provider error: {0}")]
    Provider(String),
}

pub fn coords_in_range(lat: f64, lng: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

/// Format coordinates as "12.9716°N, 77.5946°E".
pub fn format_coords(lat: f64, lng: f64) -> String {
    let ns = if lat >= 0.0 { 'N' } else { 'S' };
    let ew = if lng >= 0.0 { 'E' } else { 'W' };
    format!("{:.4}\u{00B0}{}, {:.4}\u{00B0}{}", lat.abs(), ns, lng.abs(), ew)
}
