//! Location subsystem for the courier beacon.
//!
//! Provides the shared data model, forward/reverse geocoding providers,
//! a local geocode cache and the address resolver that fronts them.

pub mod cache;
pub mod providers;
pub mod resolver;
pub mod types;

pub use cache::GeocodeCache;
pub use providers::{ForwardGeocoder, KeyedReverseGeocoder, NominatimGeocoder, ReverseGeocoder};
pub use resolver::AddressResolver;
pub use types::{
    format_coords, DeliveryLocation, GeocodeError, GeocodeMatch, InvalidSample, LocationRecord,
    LocationSource, PositionSample,
};
