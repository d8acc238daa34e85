//! Device positioning seam.
//!
//! A watch is a cancellable subscription: the sensor pushes events into the
//! channel behind a [`PositionWatch`], and dropping the watch closes the channel,
//! which is the sensor's signal to stop producing.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::location::{InvalidSample, PositionSample};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the sensor may return. Zero means always take a fresh one.
    pub maximum_age: Duration,
}

impl PositionOptions {
    /// High accuracy, 10 s timeout, never reuse a cached fix.
    pub fn tracking() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
        }
    }
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self::tracking()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("positioning is not supported")]
    Unsupported,
    #[error("permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    InvalidSample(#[from] InvalidSample),
}

pub type WatchEvent = Result<PositionSample, SensorError>;

/// Receiving end of a continuous position watch. Drop to cancel.
pub struct PositionWatch {
    rx: mpsc::Receiver<WatchEvent>,
}

impl PositionWatch {
    /// Create a watch and the sender a sensor feeds it through.
    pub fn channel(buffer: usize) -> (mpsc::Sender<WatchEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }

    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait PositionSensor: Send + Sync {
    /// Whether the platform has positioning at all.
    fn is_available(&self) -> bool;

    async fn current_position(&self, options: &PositionOptions) -> Result<PositionSample, SensorError>;

    fn watch(&self, options: &PositionOptions) -> Result<PositionWatch, SensorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_options() {
        let opts = PositionOptions::tracking();
        assert!(opts.high_accuracy);
        assert_eq!(opts.timeout, Duration::from_secs(10));
        assert_eq!(opts.maximum_age, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_dropping_watch_closes_sender() {
        let (tx, watch) = PositionWatch::channel(4);
        drop(watch);
        let sample = PositionSample::new(1.0, 2.0, 3.0).unwrap();
        assert!(tx.send(Ok(sample)).await.is_err());
    }
}
