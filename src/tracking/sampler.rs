//! Continuous device positioning with a single current-sample cell.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::lock;
use super::sensor::{PositionOptions, PositionSensor, PositionWatch, SensorError};
use crate::error::{StatusSlot, TrackError};
use crate::location::PositionSample;

/// Owns at most one position watch. The watch overwrites the current sample;
/// readers see whatever was written last.
pub struct LocationSampler {
    sensor: Arc<dyn PositionSensor>,
    options: PositionOptions,
    current: watch::Sender<Option<PositionSample>>,
    status: StatusSlot,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl LocationSampler {
    pub fn new(sensor: Arc<dyn PositionSensor>, status: StatusSlot) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            sensor,
            options: PositionOptions::tracking(),
            current,
            status,
            forwarder: Mutex::new(None),
        }
    }

    pub fn is_watching(&self) -> bool {
        lock(&self.forwarder).as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Take an immediate fix, then open the continuous watch.
    ///
    /// Returns the initial fix, or `None` when a watch was already running.
    pub async fn start(&self) -> Result<Option<PositionSample>, TrackError> {
        if self.is_watching() {
            return Ok(None);
        }

        let fix = self.fix_once().await?;

        let mut slot = lock(&self.forwarder);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(None);
        }
        let watch = self.sensor.watch(&self.options).map_err(fix_error)?;
        *slot = Some(tokio::spawn(forward(watch, self.current.clone(), self.status.clone())));
        tracing::info!(
            lat = fix.latitude,
            lng = fix.longitude,
            accuracy = fix.accuracy_meters,
            "Position watch started"
        );
        Ok(Some(fix))
    }

    /// One fresh fix, independent of the watch. Also becomes the current sample.
    pub async fn fix_once(&self) -> Result<PositionSample, TrackError> {
        if !self.sensor.is_available() {
            return Err(TrackError::CapabilityUnavailable);
        }
        let fix = self
            .sensor
            .current_position(&self.options)
            .await
            .map_err(fix_error)?;
        self.current.send_replace(Some(fix));
        Ok(fix)
    }

    /// Cancel the watch. No sample is written after this returns.
    pub async fn stop(&self) {
        let handle = lock(&self.forwarder).take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            tracing::info!("Position watch cancelled");
        }
    }

    pub fn latest(&self) -> Option<PositionSample> {
        *self.current.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PositionSample>> {
        self.current.subscribe()
    }
}

impl Drop for LocationSampler {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.forwarder).take() {
            handle.abort();
        }
    }
}

fn fix_error(err: SensorError) -> TrackError {
    match err {
        SensorError::Unsupported => TrackError::CapabilityUnavailable,
        SensorError::PermissionDenied => TrackError::PermissionDenied,
        other => TrackError::PositionUnavailable(other.to_string()),
    }
}

async fn forward(
    mut watch: PositionWatch,
    current: watch::Sender<Option<PositionSample>>,
    status: StatusSlot,
) {
    while let Some(event) = watch.next().await {
        match event {
            Ok(sample) => {
                tracing::trace!(lat = sample.latitude, lng = sample.longitude, "Position sample");
                current.send_replace(Some(sample));
                status.clear();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Location watch error");
                status.report(&TrackError::LocationWatch(e.to_string()));
            }
        }
    }
    tracing::debug!("Position watch closed by sensor");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSensor;

    fn sample(lat: f64) -> PositionSample {
        PositionSample::new(lat, 77.6, 12.0).unwrap()
    }

    #[tokio::test]
    async fn test_start_without_capability() {
        let sensor = FakeSensor::unavailable();
        let sampler = LocationSampler::new(sensor.clone(), StatusSlot::new());
        assert_eq!(sampler.start().await.unwrap_err(), TrackError::CapabilityUnavailable);
        assert!(!sampler.is_watching());
        assert_eq!(sensor.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_start_permission_denied() {
        let sensor = FakeSensor::new(sample(12.9));
        sensor.fail_fix(SensorError::PermissionDenied);
        let sampler = LocationSampler::new(sensor.clone(), StatusSlot::new());
        assert_eq!(sampler.start().await.unwrap_err(), TrackError::PermissionDenied);
        assert!(!sampler.is_watching());
        assert_eq!(sensor.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_start_uses_fresh_high_accuracy_fix() {
        let sensor = FakeSensor::new(sample(12.9));
        let sampler = LocationSampler::new(sensor.clone(), StatusSlot::new());
        let fix = sampler.start().await.unwrap().unwrap();
        assert_eq!(fix.latitude, 12.9);
        assert_eq!(sampler.latest(), Some(fix));
        assert_eq!(sensor.last_options(), Some(PositionOptions::tracking()));
    }

    #[tokio::test]
    async fn test_start_twice_single_subscription() {
        let sensor = FakeSensor::new(sample(12.9));
        let sampler = LocationSampler::new(sensor.clone(), StatusSlot::new());
        assert!(sampler.start().await.unwrap().is_some());
        assert!(sampler.start().await.unwrap().is_none());
        assert_eq!(sensor.watch_count(), 1);
    }

    #[tokio::test]
    async fn test_watch_overwrites_current_sample() {
        let sensor = FakeSensor::new(sample(12.9));
        let sampler = LocationSampler::new(sensor.clone(), StatusSlot::new());
        sampler.start().await.unwrap();
        let mut rx = sampler.subscribe();

        sensor.emit(Ok(sample(13.0))).await;
        rx.changed().await.unwrap();
        assert_eq!(sampler.latest().unwrap().latitude, 13.0);
    }

    #[tokio::test]
    async fn test_watch_error_is_not_fatal() {
        let sensor = FakeSensor::new(sample(12.9));
        let status = StatusSlot::new();
        let sampler = LocationSampler::new(sensor.clone(), status.clone());
        sampler.start().await.unwrap();
        let mut errors = status.subscribe();
        let mut rx = sampler.subscribe();

        sensor.emit(Err(SensorError::Timeout(std::time::Duration::from_secs(10)))).await;
        errors.changed().await.unwrap();
        assert!(status.current().unwrap().starts_with("Location tracking error:"));
        assert!(sampler.is_watching());

        sensor.emit(Ok(sample(13.1))).await;
        rx.changed().await.unwrap();
        assert_eq!(sampler.latest().unwrap().latitude, 13.1);
        assert!(status.current().is_none());
    }

    #[tokio::test]
    async fn test_stop_cancels_subscription() {
        let sensor = FakeSensor::new(sample(12.9));
        let sampler = LocationSampler::new(sensor.clone(), StatusSlot::new());
        sampler.start().await.unwrap();
        sampler.stop().await;
        assert!(!sampler.is_watching());
        assert!(sensor.watch_closed());

        // Idempotent, and safe when never started.
        sampler.stop().await;
        LocationSampler::new(sensor, StatusSlot::new()).stop().await;
    }

    #[tokio::test]
    async fn test_fix_once_without_watch() {
        let sensor = FakeSensor::new(sample(12.95));
        let sampler = LocationSampler::new(sensor.clone(), StatusSlot::new());
        let fix = sampler.fix_once().await.unwrap();
        assert_eq!(fix.latitude, 12.95);
        assert_eq!(sampler.latest(), Some(fix));
        assert_eq!(sensor.watch_count(), 0);
    }
}
