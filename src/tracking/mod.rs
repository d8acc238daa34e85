//! Courier-side tracking: device sampling, periodic sync and the session that owns both.

pub mod sampler;
pub mod scheduler;
pub mod sensor;
pub mod session;
pub mod simulated;

pub use sampler::LocationSampler;
pub use scheduler::{LocationSyncScheduler, UpdateListener, DEFAULT_SYNC_PERIOD};
pub use sensor::{PositionOptions, PositionSensor, PositionWatch, SensorError, WatchEvent};
pub use session::{SessionStatus, TrackingSession};
pub use simulated::SimulatedSensor;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock ignoring poison: the guarded values are plain handles that stay valid after a panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
