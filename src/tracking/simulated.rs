//! Simulated courier: walks a straight route from pickup to drop point.
//!
//! Used by the CLI when no real positioning hardware is attached. The path
//! carries a small deterministic wobble (about ±50 m) so consecutive samples
//! look like GPS readings rather than a ruler line.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::sensor::{PositionOptions, PositionSensor, PositionWatch, SensorError};
use crate::location::PositionSample;

/// Default pickup and drop points (central Bengaluru).
pub const DEFAULT_PICKUP: (f64, f64) = (12.9716, 77.5946);
pub const DEFAULT_DROP: (f64, f64) = (12.9352, 77.6245);

const WOBBLE_DEG: f64 = 0.0005;

pub struct SimulatedSensor {
    pickup: (f64, f64),
    drop: (f64, f64),
    steps: usize,
    interval: Duration,
    position: Arc<AtomicUsize>,
}

impl SimulatedSensor {
    pub fn new(pickup: (f64, f64), drop: (f64, f64), steps: usize, interval: Duration) -> Self {
        Self {
            pickup,
            drop,
            steps: steps.max(1),
            interval,
            position: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sample at route step `i`; steps past the end stay at the drop point.
    pub fn sample_at(&self, i: usize) -> Result<PositionSample, SensorError> {
        route_sample(self.pickup, self.drop, self.steps, i)
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(DEFAULT_PICKUP, DEFAULT_DROP, 10, Duration::from_secs(3))
    }
}

fn route_sample(pickup: (f64, f64), drop: (f64, f64), steps: usize, i: usize) -> Result<PositionSample, SensorError> {
    let i = i.min(steps);
    let progress = i as f64 / steps as f64;
    let (wobble_lat, wobble_lng) = if i == 0 || i == steps {
        (0.0, 0.0)
    } else {
        let k = i as f64;
        (WOBBLE_DEG * (k * 1.7).sin(), WOBBLE_DEG * (k * 2.3).cos())
    };
    let lat = pickup.0 + (drop.0 - pickup.0) * progress + wobble_lat;
    let lng = pickup.1 + (drop.1 - pickup.1) * progress + wobble_lng;

    // 10–30 m accuracy, 8–20 m/s while moving, stationary at the drop point.
    let phase = (i as f64 * 0.9).sin().abs();
    let accuracy = 10.0 + 20.0 * phase;
    let speed = if i == steps { 0.0 } else { 8.0 + 12.0 * phase };

    Ok(PositionSample::new(lat, lng, accuracy)?.with_motion(Some(speed), Some(bearing(pickup, drop))))
}

/// Initial great-circle bearing in degrees, 0 = north.
fn bearing(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lat2) = (from.0.to_radians(), to.0.to_radians());
    let dlng = (to.1 - from.1).to_radians();
    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

#[async_trait]
impl PositionSensor for SimulatedSensor {
    fn is_available(&self) -> bool {
        true
    }

    async fn current_position(&self, _options: &PositionOptions) -> Result<PositionSample, SensorError> {
        self.sample_at(self.position.load(Ordering::SeqCst))
    }

    fn watch(&self, _options: &PositionOptions) -> Result<PositionWatch, SensorError> {
        let (tx, watch) = PositionWatch::channel(8);
        let (pickup, drop, steps, interval) = (self.pickup, self.drop, self.steps, self.interval);
        let position = Arc::clone(&self.position);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let i = (position.fetch_add(1, Ordering::SeqCst) + 1).min(steps);
                position.store(i, Ordering::SeqCst);
                if tx.send(route_sample(pickup, drop, steps, i)).await.is_err() {
                    tracing::debug!("Simulated watch cancelled");
                    break;
                }
            }
        });

        Ok(watch)
    }
}
