//! A tracking session for one order: one sensor watch plus one sync timer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::sampler::LocationSampler;
use super::scheduler::{LocationSyncScheduler, UpdateListener};
use super::sensor::PositionSensor;
use crate::error::{StatusSlot, TrackError};
use crate::location::{AddressResolver, LocationRecord, PositionSample};
use crate::orders::OrderService;

/// Point-in-time view of a session, for host UIs and the CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub order_id: String,
    pub active: bool,
    pub last_sample: Option<PositionSample>,
    pub started_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Default)]
struct SessionState {
    active: bool,
    started_at: Option<DateTime<Utc>>,
}

pub struct TrackingSession {
    order_id: String,
    sampler: LocationSampler,
    scheduler: LocationSyncScheduler,
    status: StatusSlot,
    state: Mutex<SessionState>,
}

impl TrackingSession {
    pub fn new(
        order_id: impl Into<String>,
        sensor: Arc<dyn PositionSensor>,
        resolver: Arc<AddressResolver>,
        orders: Arc<dyn OrderService>,
    ) -> Self {
        let order_id = order_id.into();
        let status = StatusSlot::new();
        Self {
            sampler: LocationSampler::new(sensor, status.clone()),
            scheduler: LocationSyncScheduler::new(order_id.clone(), resolver, orders, status.clone()),
            order_id,
            status,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn with_sync_period(mut self, period: Duration) -> Self {
        self.scheduler = self.scheduler.with_period(period);
        self
    }

    pub fn on_location_update(&self, listener: UpdateListener) {
        self.scheduler.on_location_update(listener);
    }

    pub fn status_slot(&self) -> &StatusSlot {
        &self.status
    }

    /// Begin tracking. A second call while active does nothing.
    ///
    /// The initial fix is pushed right away; later samples go out on the timer.
    pub async fn start(&self) -> Result<(), TrackError> {
        let mut state = self.state.lock().await;
        if state.active {
            tracing::debug!(order_id = %self.order_id, "Tracking already active");
            return Ok(());
        }

        self.status.clear();
        let fix = match self.sampler.start().await {
            Ok(fix) => fix,
            Err(e) => {
                tracing::warn!(order_id = %self.order_id, error = %e, "Tracking could not start");
                self.status.report(&e);
                return Err(e);
            }
        };

        self.scheduler.start(self.sampler.subscribe());
        state.active = true;
        state.started_at = Some(Utc::now());
        tracing::info!(order_id = %self.order_id, "Tracking started");

        if let Some(fix) = fix {
            self.scheduler.spawn_push(fix);
        }
        Ok(())
    }

    /// Stop the watch and the timer. Safe to call at any time.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        self.sampler.stop().await;
        self.scheduler.stop().await;
        if state.active {
            tracing::info!(order_id = %self.order_id, "Tracking stopped");
        }
        state.active = false;
        state.started_at = None;
    }

    /// One-shot fix and push, whether or not periodic tracking is running.
    pub async fn update_now(&self) -> Result<LocationRecord, TrackError> {
        let sample = match self.sampler.fix_once().await {
            Ok(sample) => sample,
            Err(e) => {
                self.status.report(&e);
                return Err(e);
            }
        };
        self.scheduler.push_sample(sample).await
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.state.lock().await;
        SessionStatus {
            order_id: self.order_id.clone(),
            active: state.active,
            last_sample: self.sampler.latest(),
            started_at: state.started_at,
            error: self.status.current(),
        }
    }
}
