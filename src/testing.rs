//! Scripted doubles for the HTTP, geocoding, order service and sensor seams.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::http::{HttpClient, HttpError, HttpResponse};
use crate::location::{
    AddressResolver, ForwardGeocoder, GeocodeError, GeocodeMatch, LocationRecord, PositionSample, ReverseGeocoder,
};
use crate::orders::{OrderService, OrderServiceError, TrackingSnapshot};
use crate::tracking::{PositionOptions, PositionSensor, PositionWatch, SensorError, WatchEvent};

// ─── HTTP ───────────────────────────────────────────────────────

/// Answers requests from queues, in order. An empty queue answers 404.
#[derive(Default)]
pub struct ScriptedHttp {
    gets: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    puts: Mutex<VecDeque<HttpResponse>>,
    urls: Mutex<Vec<String>>,
    bodies: Mutex<Vec<(String, serde_json::Value)>>,
}

impl ScriptedHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond_get(&self, status: u16, body: &str) {
        self.gets.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            body: body.to_string(),
        }));
    }

    pub fn fail_get(&self, message: &str) {
        self.gets
            .lock()
            .unwrap()
            .push_back(Err(HttpError::Transport(message.to_string())));
    }

    pub fn respond_put(&self, status: u16, body: &str) {
        self.puts.lock().unwrap().push_back(HttpResponse {
            status,
            body: body.to_string(),
        });
    }

    /// Every URL requested, GET and PUT alike.
    pub fn requested_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub fn put_bodies(&self) -> Vec<(String, serde_json::Value)> {
        self.bodies.lock().unwrap().clone()
    }

    fn not_found() -> HttpResponse {
        HttpResponse {
            status: 404,
            body: String::new(),
        }
    }
}

impl HttpClient for ScriptedHttp {
    fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.urls.lock().unwrap().push(url.to_string());
        self.gets
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::not_found()))
    }

    fn put_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse, HttpError> {
        self.urls.lock().unwrap().push(url.to_string());
        self.bodies.lock().unwrap().push((url.to_string(), body.clone()));
        Ok(self.puts.lock().unwrap().pop_front().unwrap_or_else(Self::not_found))
    }
}

// ─── Geocoders ──────────────────────────────────────────────────

pub struct FakeForward {
    answer: Result<Vec<GeocodeMatch>, GeocodeError>,
    queries: Mutex<Vec<String>>,
}

impl FakeForward {
    pub fn with_matches(matches: Vec<GeocodeMatch>) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(matches),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(GeocodeError::Provider(message.to_string())),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ForwardGeocoder for FakeForward {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeMatch>, GeocodeError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.answer.clone()
    }
}

pub struct FakeReverse {
    answer: Option<String>,
}

impl FakeReverse {
    pub fn answering(address: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(address.to_string()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { answer: None })
    }
}

#[async_trait]
impl ReverseGeocoder for FakeReverse {
    async fn lookup(&self, _lat: f64, _lng: f64) -> Result<Option<String>, GeocodeError> {
        match &self.answer {
            Some(address) => Ok(Some(address.clone())),
            None => Err(GeocodeError::Provider("REQUEST_DENIED".into())),
        }
    }
}

pub fn resolver_with(forward: Arc<FakeForward>, reverse: Arc<FakeReverse>) -> AddressResolver {
    AddressResolver::new(forward, reverse)
}

// ─── Order service ──────────────────────────────────────────────

#[derive(Default)]
pub struct FakeOrders {
    pushes: Mutex<Vec<(String, LocationRecord)>>,
    push_failure: Mutex<Option<String>>,
    push_delay: Mutex<Option<Duration>>,
    tracking: Mutex<Option<Result<TrackingSnapshot, String>>>,
    tracking_calls: AtomicUsize,
}

impl FakeOrders {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Successful pushes, recorded when they complete.
    pub fn pushes(&self) -> Vec<(String, LocationRecord)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn fail_pushes(&self, message: &str) {
        *self.push_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn succeed_pushes(&self) {
        *self.push_failure.lock().unwrap() = None;
    }

    pub fn delay_pushes(&self, delay: Duration) {
        *self.push_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_tracking(&self, snapshot: TrackingSnapshot) {
        *self.tracking.lock().unwrap() = Some(Ok(snapshot));
    }

    pub fn fail_tracking(&self, message: &str) {
        *self.tracking.lock().unwrap() = Some(Err(message.to_string()));
    }

    pub fn tracking_calls(&self) -> usize {
        self.tracking_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderService for FakeOrders {
    async fn fetch_tracking(&self, _order_id: &str) -> Result<TrackingSnapshot, OrderServiceError> {
        self.tracking_calls.fetch_add(1, Ordering::SeqCst);
        match self.tracking.lock().unwrap().clone() {
            Some(Ok(snapshot)) => Ok(snapshot),
            Some(Err(message)) => Err(OrderServiceError::Rejected { status: 500, message }),
            None => Err(OrderServiceError::Rejected {
                status: 404,
                message: "Order not found".into(),
            }),
        }
    }

    async fn push_location(&self, order_id: &str, record: &LocationRecord) -> Result<(), OrderServiceError> {
        let delay = *self.push_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.push_failure.lock().unwrap().clone();
        if let Some(message) = failure {
            return Err(OrderServiceError::Rejected { status: 503, message });
        }
        self.pushes
            .lock()
            .unwrap()
            .push((order_id.to_string(), record.clone()));
        Ok(())
    }
}

// ─── Sensor ─────────────────────────────────────────────────────

/// Answers fixes with a fixed sample; watch events are pushed with [`FakeSensor::emit`].
pub struct FakeSensor {
    available: bool,
    fix: Mutex<Result<PositionSample, SensorError>>,
    watch_tx: Mutex<Option<mpsc::Sender<WatchEvent>>>,
    watches: AtomicUsize,
    options: Mutex<Option<PositionOptions>>,
}

impl FakeSensor {
    pub fn new(sample: PositionSample) -> Arc<Self> {
        Arc::new(Self {
            available: true,
            fix: Mutex::new(Ok(sample)),
            watch_tx: Mutex::new(None),
            watches: AtomicUsize::new(0),
            options: Mutex::new(None),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            available: false,
            fix: Mutex::new(Err(SensorError::Unsupported)),
            watch_tx: Mutex::new(None),
            watches: AtomicUsize::new(0),
            options: Mutex::new(None),
        })
    }

    pub fn fail_fix(&self, err: SensorError) {
        *self.fix.lock().unwrap() = Err(err);
    }

    pub fn watch_count(&self) -> usize {
        self.watches.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<PositionOptions> {
        *self.options.lock().unwrap()
    }

    /// Feed an event into the open watch. Dropped when no watch is open.
    pub async fn emit(&self, event: WatchEvent) {
        let tx = self.watch_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    /// True once the consumer has dropped the latest watch, or when none was opened.
    pub fn watch_closed(&self) -> bool {
        match self.watch_tx.lock().unwrap().as_ref() {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }
}

#[async_trait]
impl PositionSensor for FakeSensor {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn current_position(&self, options: &PositionOptions) -> Result<PositionSample, SensorError> {
        *self.options.lock().unwrap() = Some(*options);
        self.fix.lock().unwrap().clone()
    }

    fn watch(&self, options: &PositionOptions) -> Result<PositionWatch, SensorError> {
        if !self.available {
            return Err(SensorError::Unsupported);
        }
        *self.options.lock().unwrap() = Some(*options);
        let (tx, watch) = PositionWatch::channel(16);
        *self.watch_tx.lock().unwrap() = Some(tx);
        self.watches.fetch_add(1, Ordering::SeqCst);
        Ok(watch)
    }
}
