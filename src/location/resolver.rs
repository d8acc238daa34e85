//! Address resolver: forward and reverse geocoding over pluggable providers.
//!
//! Forward flow:  Cache → provider → first match | NoMatch | ProviderError
//! Reverse flow:  provider → formatted address | "" (never fails)

use std::sync::{Arc, Mutex};

use super::cache::GeocodeCache;
use super::providers::{ForwardGeocoder, ReverseGeocoder};
use super::types::{coords_in_range, GeocodeError, GeocodeMatch};

pub struct AddressResolver {
    forward: Arc<dyn ForwardGeocoder>,
    reverse: Arc<dyn ReverseGeocoder>,
    cache: Option<Mutex<GeocodeCache>>,
}

impl AddressResolver {
    pub fn new(forward: Arc<dyn ForwardGeocoder>, reverse: Arc<dyn ReverseGeocoder>) -> Self {
        Self {
            forward,
            reverse,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: GeocodeCache) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    /// First match for a free-text or postal query.
    pub async fn forward_geocode(&self, query: &str) -> Result<GeocodeMatch, GeocodeError> {
        if let Some(hit) = self.cache_get(query) {
            tracing::debug!(query, "Geocode cache hit");
            return Ok(hit);
        }

        let found = self
            .forward
            .search(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NoMatch(query.to_string()))?;
        if !coords_in_range(found.lat, found.lng) {
            return Err(GeocodeError::Provider(format!(
                "coordinates out of range: {}, {}",
                found.lat, found.lng
            )));
        }

        tracing::debug!(query, lat = found.lat, lng = found.lng, "Forward geocoded");
        self.cache_put(query, &found);
        Ok(found)
    }

    /// Formatted address for a coordinate, or an empty string on any failure.
    pub async fn reverse_geocode(&self, lat: f64, lng: f64) -> String {
        match self.reverse.lookup(lat, lng).await {
            Ok(Some(address)) => address,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::debug!(lat, lng, error = %e, "Reverse geocode failed");
                String::new()
            }
        }
    }

    fn cache_get(&self, query: &str) -> Option<GeocodeMatch> {
        let cache = self.cache.as_ref()?;
        cache.lock().ok()?.get(query)
    }

    fn cache_put(&self, query: &str, found: &GeocodeMatch) {
        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.put(query, found);
            }
        }
    }
}
