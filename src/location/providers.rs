//! Geocoding providers: Nominatim (forward, unauthenticated) and a keyed reverse geocoder.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::types::{coords_in_range, GeocodeError, GeocodeMatch};
use crate::http::{self, HttpClient};

/// Free-text / postal-code lookup.
#[async_trait]
pub trait ForwardGeocoder: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeMatch>, GeocodeError>;
}

/// Coordinates to formatted address.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn lookup(&self, lat: f64, lng: f64) -> Result<Option<String>, GeocodeError>;
}

// ─── Nominatim provider ─────────────────────────────────────────

#[derive(Deserialize, Debug, Clone)]
pub struct NominatimResult {
    pub lat: String,
    pub lon: String,
    pub display_name: String,
}

impl NominatimResult {
    fn to_match(&self) -> Result<GeocodeMatch, GeocodeError> {
        let lat: f64 = self
            .lat
            .parse()
            .map_err(|_| GeocodeError::Provider(format!("bad latitude '{}'", self.lat)))?;
        let lng: f64 = self
            .lon
            .parse()
            .map_err(|_| GeocodeError::Provider(format!("bad longitude '{}'", self.lon)))?;
        if !coords_in_range(lat, lng) {
            return Err(GeocodeError::Provider(format!(
                "coordinates out of range: {}, {}",
                self.lat, self.lon
            )));
        }
        Ok(GeocodeMatch {
            lat,
            lng,
            address: self.display_name.clone(),
        })
    }
}

pub struct NominatimGeocoder {
    client: Arc<dyn HttpClient>,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}?q={}&format=json&limit=1&addressdetails=1",
            self.base_url,
            http::urlencode(query),
        )
    }
}

#[async_trait]
impl ForwardGeocoder for NominatimGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeMatch>, GeocodeError> {
        let response = http::get_async(&self.client, self.search_url(query))
            .await
            .map_err(|e| GeocodeError::Provider(e.to_string()))?;

        if !response.is_success() {
            return Err(GeocodeError::Provider(format!("HTTP {}", response.status)));
        }

        let results: Vec<NominatimResult> = serde_json::from_str(&response.body)
            .map_err(|e| GeocodeError::Provider(format!("invalid response: {}", e)))?;

        results.iter().map(NominatimResult::to_match).collect()
    }
}

// ─── Reverse geocoding (keyed) ──────────────────────────────────

#[derive(Deserialize, Debug, Default)]
struct ReverseResponse {
    #[serde(default)]
    results: Vec<ReverseResult>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ReverseResult {
    formatted_address: String,
}

pub struct KeyedReverseGeocoder {
    client: Arc<dyn HttpClient>,
    base_url: String,
    /// Sent as-is, even when empty: a missing key degrades results, it never blocks the call.
    api_key: String,
}

impl KeyedReverseGeocoder {
    pub fn new(client: Arc<dyn HttpClient>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let api_key = api_key.unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("No maps credential configured; reverse geocoding will likely return no address");
        }
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    fn lookup_url(&self, lat: f64, lng: f64) -> String {
        format!(
            "{}?latlng={},{}&key={}",
            self.base_url,
            lat,
            lng,
            http::urlencode(&self.api_key),
        )
    }
}

#[async_trait]
impl ReverseGeocoder for KeyedReverseGeocoder {
    async fn lookup(&self, lat: f64, lng: f64) -> Result<Option<String>, GeocodeError> {
        let response = http::get_async(&self.client, self.lookup_url(lat, lng))
            .await
            .map_err(|e| GeocodeError::Provider(e.to_string()))?;

        let parsed: ReverseResponse = serde_json::from_str(&response.body)
            .map_err(|e| GeocodeError::Provider(format!("invalid response: {}", e)))?;

        if parsed.results.is_empty() {
            if let Some(status) = parsed.status.as_deref() {
                tracing::debug!(status, lat, lng, "Reverse geocode returned no results");
            }
        }

        Ok(parsed.results.into_iter().next().map(|r| r.formatted_address))
    }
}
