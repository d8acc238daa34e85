//! Error kinds for the beacon and the single user-visible status slot.
//!
//! Leaf errors (`HttpError`, `GeocodeError`, `SensorError`, `OrderServiceError`)
//! live next to the code that produces them; `TrackError` is what callers see.

use tokio::sync::watch;

use crate::location::GeocodeError;

/// Errors surfaced by the tracking, reconciliation and map components.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackError {
    #[error("Geolocation is not supported on this device")]
    CapabilityUnavailable,
    #[error("Failed to get location: permission denied")]
    PermissionDenied,
    #[error("Failed to get location: {0}")]
    PositionUnavailable(String),
    #[error("Failed to load map provider: {0}")]
    ProviderLoadFailure(String),
    #[error("Failed to initialize map: {0}")]
    MapInit(String),
    #[error("Map provider is not ready")]
    MapNotReady,
    #[error("Failed to get location for pincode: {pincode}")]
    GeocodeNoMatch { pincode: String },
    #[error("Failed to get location for pincode: {pincode}")]
    GeocodeProviderError { pincode: String, message: String },
    #[error("Failed to update location: {0}")]
    SyncPushFailure(String),
    #[error("Location tracking error: {0}")]
    LocationWatch(String),
    #[error("Could not get location from tracking data: {0}")]
    TrackingFetchFailure(String),
    #[error("Pincode is required")]
    MissingPincode,
}

impl TrackError {
    /// Transient errors are shown but never stop the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SyncPushFailure(_) | Self::LocationWatch(_))
    }

    pub(crate) fn from_geocode(pincode: &str, err: GeocodeError) -> Self {
        match err {
            GeocodeError::NoMatch(_) => Self::GeocodeNoMatch {
                pincode: pincode.to_string(),
            },
            GeocodeError::Provider(message) => Self::GeocodeProviderError {
                pincode: pincode.to_string(),
                message,
            },
        }
    }
}

/// Holds the one error message currently shown to the user.
///
/// Cloning shares the slot. Any successful operation calls [`StatusSlot::clear`].
#[derive(Clone)]
pub struct StatusSlot {
    tx: watch::Sender<Option<String>>,
}

impl StatusSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn report(&self, err: &TrackError) {
        self.set_message(err.to_string());
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.tx.send_replace(Some(message.into()));
    }

    pub fn clear(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for StatusSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geocode_errors_share_pincode_message() {
        let no_match = TrackError::from_geocode("560001", GeocodeError::NoMatch("560001, India".into()));
        let provider = TrackError::from_geocode("560001", GeocodeError::Provider("timeout".into()));
        assert_eq!(no_match.to_string(), "Failed to get location for pincode: 560001");
        assert_eq!(provider.to_string(), "Failed to get location for pincode: 560001");
        assert!(matches!(no_match, TrackError::GeocodeNoMatch { .. }));
    }

    #[test]
    fn test_status_slot_keeps_latest_message() {
        let slot = StatusSlot::new();
        slot.report(&TrackError::SyncPushFailure("503".into()));
        slot.report(&TrackError::PermissionDenied);
        assert_eq!(
            slot.current().as_deref(),
            Some("Failed to get location: permission denied")
        );
        slot.clear();
        assert!(slot.current().is_none());
    }

    #[test]
    fn test_transient_kinds() {
        assert!(TrackError::SyncPushFailure("x".into()).is_transient());
        assert!(TrackError::LocationWatch("signal lost".into()).is_transient());
        assert!(!TrackError::TrackingFetchFailure("x".into()).is_transient());
        assert!(!TrackError::CapabilityUnavailable.is_transient());
    }
}
