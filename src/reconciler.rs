//! Picks the one delivery location to display.
//!
//! Flow:  tracking history (order id) → pincode geocode → error
//!
//! Tracking data is the courier's real position, so it always wins over a
//! pincode centroid when the order service has one.

use std::sync::Arc;

use crate::error::TrackError;
use crate::location::types::coords_in_range;
use crate::location::{AddressResolver, DeliveryLocation, LocationSource};
use crate::orders::OrderService;

/// Appended to every pincode lookup.
pub const COUNTRY_QUALIFIER: &str = "India";

pub struct LocationSourceReconciler {
    orders: Arc<dyn OrderService>,
    resolver: Arc<AddressResolver>,
}

impl LocationSourceReconciler {
    pub fn new(orders: Arc<dyn OrderService>, resolver: Arc<AddressResolver>) -> Self {
        Self { orders, resolver }
    }

    pub async fn resolve(
        &self,
        order_id: Option<&str>,
        pincode: &str,
        address: Option<&str>,
    ) -> Result<DeliveryLocation, TrackError> {
        let pincode = pincode.trim();
        if pincode.is_empty() {
            return Err(TrackError::MissingPincode);
        }

        if let Some(order_id) = order_id.filter(|id| !id.trim().is_empty()) {
            match self.from_tracking(order_id, address).await {
                Ok(Some(location)) => return Ok(location),
                Ok(None) => {
                    tracing::debug!(order_id, "No tracked location, geocoding pincode");
                }
                Err(e) => {
                    tracing::info!(order_id, error = %e, "Could not get location from tracking data, geocoding pincode");
                }
            }
        }

        let query = format!("{}, {}", pincode, COUNTRY_QUALIFIER);
        match self.resolver.forward_geocode(&query).await {
            Ok(found) => Ok(DeliveryLocation {
                latitude: found.lat,
                longitude: found.lng,
                address: Some(found.address),
                source: LocationSource::GeocodedFallback,
            }),
            Err(e) => {
                tracing::warn!(pincode, error = %e, "Pincode geocoding failed");
                Err(TrackError::from_geocode(pincode, e))
            }
        }
    }

    /// `Ok(None)` when the service has no usable point; errors are soft misses.
    async fn from_tracking(
        &self,
        order_id: &str,
        address: Option<&str>,
    ) -> Result<Option<DeliveryLocation>, TrackError> {
        let snapshot = self
            .orders
            .fetch_tracking(order_id)
            .await
            .map_err(|e| TrackError::TrackingFetchFailure(e.to_string()))?;

        let Some(point) = snapshot.delivery_location else {
            return Ok(None);
        };
        let (Some(lat), Some(lng)) = (point.lat, point.lng) else {
            return Ok(None);
        };
        if !coords_in_range(lat, lng) {
            tracing::warn!(order_id, lat, lng, "Tracked location out of range, ignoring");
            return Ok(None);
        }

        Ok(Some(DeliveryLocation {
            latitude: lat,
            longitude: lng,
            address: point.address.or_else(|| address.map(str::to_string)),
            source: LocationSource::TrackingHistory,
        }))
    }
}
