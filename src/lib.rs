//! Courier location beacon.
//!
//! Courier side: [`tracking`] samples the device position and pushes it to the
//! order service on a fixed period. Customer side: [`reconciler`] picks the
//! delivery location to show and [`map`] binds it to a map widget.

pub mod config;
pub mod error;
pub mod http;
pub mod location;
pub mod map;
pub mod orders;
pub mod reconciler;
pub mod server;
pub mod tracking;

#[cfg(test)]
mod testing;

pub use error::{StatusSlot, TrackError};
