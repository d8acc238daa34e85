//! Periodic location sync: every period, push whatever sample is current.
//!
//! The timer never waits for a fresher sample, so an unchanged sample is pushed
//! again on the next tick. Each push runs in its own task; a push issued before
//! `stop()` is allowed to finish but its outcome is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::lock;
use crate::error::{StatusSlot, TrackError};
use crate::location::{AddressResolver, LocationRecord, PositionSample};
use crate::orders::OrderService;

pub const DEFAULT_SYNC_PERIOD: Duration = Duration::from_secs(5);

/// Invoked after each successful push.
pub type UpdateListener = Arc<dyn Fn(&LocationRecord) + Send + Sync>;

struct SyncCore {
    order_id: String,
    resolver: Arc<AddressResolver>,
    orders: Arc<dyn OrderService>,
    status: StatusSlot,
    listener: Mutex<Option<UpdateListener>>,
    epoch: AtomicU64,
}

impl SyncCore {
    async fn compose(&self, sample: PositionSample) -> LocationRecord {
        let resolved_address = self.resolver.reverse_geocode(sample.latitude, sample.longitude).await;
        LocationRecord {
            sample,
            resolved_address,
        }
    }

    /// `issued_in` is the epoch a timed push was spawned in; `None` always reports.
    async fn push(&self, sample: PositionSample, issued_in: Option<u64>) -> Result<LocationRecord, TrackError> {
        let record = self.compose(sample).await;
        let result = self.orders.push_location(&self.order_id, &record).await;

        if let Some(epoch) = issued_in {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                tracing::debug!(order_id = %self.order_id, "Discarding push result from a stopped session");
                return result
                    .map(|_| record)
                    .map_err(|e| TrackError::SyncPushFailure(e.to_string()));
            }
        }

        match result {
            Ok(()) => {
                tracing::info!(
                    order_id = %self.order_id,
                    lat = record.sample.latitude,
                    lng = record.sample.longitude,
                    address = %record.resolved_address,
                    "Location pushed"
                );
                self.status.clear();
                let listener = lock(&self.listener).clone();
                if let Some(listener) = listener {
                    listener(&record);
                }
                Ok(record)
            }
            Err(e) => {
                let err = TrackError::SyncPushFailure(e.to_string());
                tracing::warn!(order_id = %self.order_id, error = %e, "Location push failed");
                self.status.report(&err);
                Err(err)
            }
        }
    }
}

pub struct LocationSyncScheduler {
    core: Arc<SyncCore>,
    period: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl LocationSyncScheduler {
    pub fn new(
        order_id: impl Into<String>,
        resolver: Arc<AddressResolver>,
        orders: Arc<dyn OrderService>,
        status: StatusSlot,
    ) -> Self {
        Self {
            core: Arc::new(SyncCore {
                order_id: order_id.into(),
                resolver,
                orders,
                status,
                listener: Mutex::new(None),
                epoch: AtomicU64::new(0),
            }),
            period: DEFAULT_SYNC_PERIOD,
            timer: Mutex::new(None),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn on_location_update(&self, listener: UpdateListener) {
        *lock(&self.core.listener) = Some(listener);
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer).as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start ticking. The first tick fires one period from now. No-op while running.
    pub fn start(&self, samples: watch::Receiver<Option<PositionSample>>) {
        let mut timer = lock(&self.timer);
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let epoch = self.core.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *timer = Some(tokio::spawn(run_ticks(Arc::clone(&self.core), samples, self.period, epoch)));
        tracing::info!(order_id = %self.core.order_id, period_ms = self.period.as_millis() as u64, "Sync timer started");
    }

    /// Cancel the timer. Pushes already in flight finish but are not reported.
    pub async fn stop(&self) {
        self.core.epoch.fetch_add(1, Ordering::SeqCst);
        let handle = lock(&self.timer).take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            tracing::info!(order_id = %self.core.order_id, "Sync timer stopped");
        }
    }

    /// Compose and push one sample now, awaiting the outcome. Works with or without the timer.
    pub async fn push_sample(&self, sample: PositionSample) -> Result<LocationRecord, TrackError> {
        self.core.push(sample, None).await
    }

    /// Push in the background under the current epoch, like a timer tick.
    pub fn spawn_push(&self, sample: PositionSample) {
        let core = Arc::clone(&self.core);
        let epoch = core.epoch.load(Ordering::SeqCst);
        tokio::spawn(async move {
            let _ = core.push(sample, Some(epoch)).await;
        });
    }
}

impl Drop for LocationSyncScheduler {
    fn drop(&mut self) {
        self.core.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
        }
    }
}

async fn run_ticks(
    core: Arc<SyncCore>,
    samples: watch::Receiver<Option<PositionSample>>,
    period: Duration,
    epoch: u64,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let current = *samples.borrow();
        let Some(sample) = current else {
            tracing::trace!(order_id = %core.order_id, "Tick without a sample");
            continue;
        };
        let core = Arc::clone(&core);
        tokio::spawn(async move {
            let _ = core.push(sample, Some(epoch)).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{resolver_with, FakeForward, FakeOrders, FakeReverse};
    use std::sync::atomic::AtomicUsize;

    fn sample(lat: f64) -> PositionSample {
        PositionSample::new(lat, 77.6, 10.0).unwrap()
    }

    fn scheduler(orders: Arc<FakeOrders>, reverse: Arc<FakeReverse>, status: StatusSlot) -> LocationSyncScheduler {
        let resolver = Arc::new(resolver_with(FakeForward::with_matches(vec![]), reverse));
        LocationSyncScheduler::new("abc", resolver, orders, status)
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_push_before_first_period() {
        let orders = FakeOrders::new();
        let sched = scheduler(orders.clone(), FakeReverse::answering("MG Road"), StatusSlot::new());
        let (_tx, rx) = watch::channel(Some(sample(12.9)));
        sched.start(rx);

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(orders.pushes().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orders.pushes().len(), 1);
        assert_eq!(orders.pushes()[0].1.resolved_address, "MG Road");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_sample_pushed_every_tick() {
        let orders = FakeOrders::new();
        let sched = scheduler(orders.clone(), FakeReverse::answering("MG Road"), StatusSlot::new());
        let s = sample(12.9);
        let (_tx, rx) = watch::channel(Some(s));
        sched.start(rx);

        tokio::time::sleep(Duration::from_millis(10_100)).await;
        let pushes = orders.pushes();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[0].1.sample, s);
        assert_eq!(pushes[0].1, pushes[1].1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_pushes_latest_sample() {
        let orders = FakeOrders::new();
        let sched = scheduler(orders.clone(), FakeReverse::failing(), StatusSlot::new());
        let (tx, rx) = watch::channel(None);
        sched.start(rx);

        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert!(orders.pushes().is_empty());

        tx.send_replace(Some(sample(12.91)));
        tx.send_replace(Some(sample(12.92)));
        tokio::time::sleep(Duration::from_secs(5)).await;
        let pushes = orders.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].1.sample.latitude, 12.92);
        assert_eq!(pushes[0].1.resolved_address, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_failure_is_transient() {
        let orders = FakeOrders::new();
        orders.fail_pushes("HTTP 503");
        let status = StatusSlot::new();
        let sched = scheduler(orders.clone(), FakeReverse::failing(), status.clone());
        let (_tx, rx) = watch::channel(Some(sample(12.9)));
        sched.start(rx);

        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert_eq!(status.current().as_deref(), Some("Failed to update location: HTTP 503"));
        assert!(sched.is_running());

        orders.succeed_pushes();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(status.current().is_none());
        assert_eq!(orders.pushes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_pushes() {
        let orders = FakeOrders::new();
        let sched = scheduler(orders.clone(), FakeReverse::failing(), StatusSlot::new());
        let (_tx, rx) = watch::channel(Some(sample(12.9)));
        sched.start(rx);

        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert_eq!(orders.pushes().len(), 1);

        sched.stop().await;
        assert!(!sched.is_running());
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(orders.pushes().len(), 1);

        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_single_timer() {
        let orders = FakeOrders::new();
        let sched = scheduler(orders.clone(), FakeReverse::failing(), StatusSlot::new());
        let (_tx, rx) = watch::channel(Some(sample(12.9)));
        sched.start(rx.clone());
        sched.start(rx);

        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert_eq!(orders.pushes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_after_stop_is_discarded() {
        let orders = FakeOrders::new();
        orders.delay_pushes(Duration::from_secs(2));
        let calls = Arc::new(AtomicUsize::new(0));
        let status = StatusSlot::new();
        let sched = scheduler(orders.clone(), FakeReverse::failing(), status.clone());
        let seen = Arc::clone(&calls);
        sched.on_location_update(Arc::new(move |_: &LocationRecord| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        let (_tx, rx) = watch::channel(Some(sample(12.9)));
        sched.start(rx);

        // Tick at 5 s issues a push that completes at 7 s.
        tokio::time::sleep(Duration::from_millis(5100)).await;
        sched.stop().await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(orders.pushes().len(), 1, "in-flight push still reaches the service");
        assert_eq!(calls.load(Ordering::SeqCst), 0, "but its result is not reported");
    }

    #[tokio::test]
    async fn test_manual_push_reports_listener() {
        let orders = FakeOrders::new();
        let sched = scheduler(orders.clone(), FakeReverse::answering("Brigade Road"), StatusSlot::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sched.on_location_update(Arc::new(move |record: &LocationRecord| {
            sink.lock().unwrap().push(record.resolved_address.clone());
        }));

        let record = sched.push_sample(sample(12.97)).await.unwrap();
        assert_eq!(record.resolved_address, "Brigade Road");
        assert_eq!(*seen.lock().unwrap(), vec!["Brigade Road".to_string()]);
        assert!(!sched.is_running());
    }

    #[tokio::test]
    async fn test_manual_push_failure() {
        let orders = FakeOrders::new();
        orders.fail_pushes("Order is not assigned to you");
        let status = StatusSlot::new();
        let sched = scheduler(orders, FakeReverse::failing(), status.clone());
        let err = sched.push_sample(sample(12.9)).await.unwrap_err();
        assert_eq!(err, TrackError::SyncPushFailure("Order is not assigned to you".into()));
        assert_eq!(
            status.current().as_deref(),
            Some("Failed to update location: Order is not assigned to you")
        );
    }
}
