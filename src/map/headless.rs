//! In-process host document and widget.
//!
//! Scripts "load" immediately unless the document is created with
//! [`HeadlessDocument::manual`], in which case the caller completes them with
//! [`HeadlessDocument::finish_script`]. The widget records every call so the
//! resulting binding can be inspected or printed.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

use super::host::{
    ClickHandler, ContainerId, ElementId, HostDocument, LatLng, MapId, MapOptions, MapWidgetApi, MarkerId,
    MarkerOptions, OverlayElement, OverlayId, ScriptEvent, WidgetError,
};
use crate::tracking::lock;

#[derive(Debug, Clone)]
enum LoadMode {
    Immediate,
    Fail(String),
    Manual,
}

#[derive(Default)]
struct DocState {
    scripts: HashSet<String>,
    injected: Vec<String>,
    pending: HashMap<String, Vec<oneshot::Sender<ScriptEvent>>>,
    api_loaded: bool,
    elements: Vec<OverlayElement>,
    observers: Vec<mpsc::UnboundedSender<()>>,
}

pub struct HeadlessDocument {
    mode: LoadMode,
    widget: Arc<RecordingWidget>,
    state: Mutex<DocState>,
    next_element: AtomicU64,
}

impl HeadlessDocument {
    /// Injected scripts load at once.
    pub fn new() -> Arc<Self> {
        Self::with_mode(LoadMode::Immediate)
    }

    /// Injected scripts fail at once with `message`.
    pub fn failing(message: &str) -> Arc<Self> {
        Self::with_mode(LoadMode::Fail(message.to_string()))
    }

    /// Injected scripts stay pending until [`finish_script`](Self::finish_script).
    pub fn manual() -> Arc<Self> {
        Self::with_mode(LoadMode::Manual)
    }

    fn with_mode(mode: LoadMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            widget: Arc::new(RecordingWidget::default()),
            state: Mutex::new(DocState::default()),
            next_element: AtomicU64::new(1),
        })
    }

    pub fn widget(&self) -> Arc<RecordingWidget> {
        Arc::clone(&self.widget)
    }

    /// Put a script tag in the page as if another view had added it.
    pub fn preload_script(&self, url: &str, api_loaded: bool) {
        let mut state = lock(&self.state);
        state.scripts.insert(url.to_string());
        state.api_loaded |= api_loaded;
    }

    /// Deliver a load or error event to everyone listening on `url`.
    pub fn finish_script(&self, url: &str, event: ScriptEvent) {
        let listeners = {
            let mut state = lock(&self.state);
            if event == ScriptEvent::Loaded {
                state.api_loaded = true;
            }
            state.pending.remove(url).unwrap_or_default()
        };
        for tx in listeners {
            let _ = tx.send(event.clone());
        }
    }

    pub fn injected_scripts(&self) -> Vec<String> {
        lock(&self.state).injected.clone()
    }

    /// Append a `div` and notify mutation observers.
    pub fn add_element(&self, style: &str, text: &str) -> ElementId {
        let id = ElementId(self.next_element.fetch_add(1, Ordering::SeqCst));
        let mut state = lock(&self.state);
        state.elements.push(OverlayElement {
            id,
            style: style.to_string(),
            text: text.to_string(),
            hidden: false,
        });
        state.observers.retain(|tx| tx.send(()).is_ok());
        id
    }

    pub fn is_hidden(&self, id: ElementId) -> bool {
        lock(&self.state).elements.iter().any(|e| e.id == id && e.hidden)
    }

    pub fn element_count(&self) -> usize {
        lock(&self.state).elements.len()
    }

    fn listen(&self, state: &mut DocState, url: &str) -> oneshot::Receiver<ScriptEvent> {
        let (tx, rx) = oneshot::channel();
        match &self.mode {
            LoadMode::Immediate => {
                state.api_loaded = true;
                let _ = tx.send(ScriptEvent::Loaded);
            }
            LoadMode::Fail(message) => {
                let _ = tx.send(ScriptEvent::Failed(message.clone()));
            }
            LoadMode::Manual => state.pending.entry(url.to_string()).or_default().push(tx),
        }
        rx
    }
}

impl HostDocument for HeadlessDocument {
    fn script_present(&self, url: &str) -> bool {
        lock(&self.state).scripts.contains(url)
    }

    fn widget_api(&self) -> Option<Arc<dyn MapWidgetApi>> {
        if lock(&self.state).api_loaded {
            Some(self.widget.clone())
        } else {
            None
        }
    }

    fn inject_script(&self, url: &str) -> oneshot::Receiver<ScriptEvent> {
        let mut state = lock(&self.state);
        state.scripts.insert(url.to_string());
        state.injected.push(url.to_string());
        self.listen(&mut state, url)
    }

    fn on_script_event(&self, url: &str) -> oneshot::Receiver<ScriptEvent> {
        let mut state = lock(&self.state);
        self.listen(&mut state, url)
    }

    fn overlay_elements(&self) -> Vec<OverlayElement> {
        lock(&self.state).elements.clone()
    }

    fn hide_element(&self, id: ElementId) {
        let mut state = lock(&self.state);
        if let Some(element) = state.elements.iter_mut().find(|e| e.id == id) {
            element.hidden = true;
        }
    }

    fn observe_mutations(&self) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).observers.push(tx);
        rx
    }
}

// ─── Widget ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RecordedMap {
    pub id: MapId,
    pub container: ContainerId,
    pub options: MapOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedMarker {
    pub id: MarkerId,
    pub map: MapId,
    pub options: MarkerOptions,
}

#[derive(Default)]
struct WidgetState {
    maps: BTreeMap<u64, RecordedMap>,
    markers: BTreeMap<u64, RecordedMarker>,
    overlays: BTreeMap<u64, String>,
    opened: Vec<(OverlayId, MapId, MarkerId)>,
    handlers: HashMap<MarkerId, Arc<ClickHandler>>,
    fail_next_map: Option<String>,
    fail_next_marker: Option<String>,
}

#[derive(Default)]
pub struct RecordingWidget {
    next_id: AtomicU64,
    state: Mutex<WidgetState>,
}

impl RecordingWidget {
    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Make the next `create_map` call fail.
    pub fn fail_next_map(&self, message: &str) {
        lock(&self.state).fail_next_map = Some(message.to_string());
    }

    /// Make the next `add_marker` call fail.
    pub fn fail_next_marker(&self, message: &str) {
        lock(&self.state).fail_next_marker = Some(message.to_string());
    }

    pub fn maps(&self) -> Vec<RecordedMap> {
        lock(&self.state).maps.values().cloned().collect()
    }

    /// Markers currently on a map.
    pub fn markers(&self) -> Vec<RecordedMarker> {
        lock(&self.state).markers.values().cloned().collect()
    }

    /// Body of an overlay that has not been closed.
    pub fn overlay_html(&self, overlay: OverlayId) -> Option<String> {
        lock(&self.state).overlays.get(&overlay.0).cloned()
    }

    /// Every `open_info_overlay` call, in order.
    pub fn opened(&self) -> Vec<(OverlayId, MapId, MarkerId)> {
        lock(&self.state).opened.clone()
    }

    /// Simulate a user click. Returns false when the marker has no handler.
    pub fn click(&self, marker: MarkerId) -> bool {
        let handler = lock(&self.state).handlers.get(&marker).cloned();
        match handler {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }
}

impl MapWidgetApi for RecordingWidget {
    fn create_map(&self, container: &ContainerId, options: &MapOptions) -> Result<MapId, WidgetError> {
        let mut state = lock(&self.state);
        if let Some(message) = state.fail_next_map.take() {
            return Err(WidgetError(message));
        }
        let id = MapId(self.next());
        state.maps.insert(
            id.0,
            RecordedMap {
                id,
                container: container.clone(),
                options: options.clone(),
            },
        );
        Ok(id)
    }

    fn set_center(&self, map: MapId, center: LatLng, zoom: u8) -> Result<(), WidgetError> {
        let mut state = lock(&self.state);
        let recorded = state
            .maps
            .get_mut(&map.0)
            .ok_or_else(|| WidgetError(format!("unknown map {}", map.0)))?;
        recorded.options.center = center;
        recorded.options.zoom = zoom;
        Ok(())
    }

    fn add_marker(&self, map: MapId, options: &MarkerOptions) -> Result<MarkerId, WidgetError> {
        let mut state = lock(&self.state);
        if let Some(message) = state.fail_next_marker.take() {
            return Err(WidgetError(message));
        }
        if !state.maps.contains_key(&map.0) {
            return Err(WidgetError(format!("unknown map {}", map.0)));
        }
        let id = MarkerId(self.next());
        state.markers.insert(
            id.0,
            RecordedMarker {
                id,
                map,
                options: options.clone(),
            },
        );
        Ok(id)
    }

    fn remove_marker(&self, marker: MarkerId) {
        let mut state = lock(&self.state);
        state.markers.remove(&marker.0);
        state.handlers.remove(&marker);
    }

    fn create_info_overlay(&self, html: &str) -> Result<OverlayId, WidgetError> {
        let id = OverlayId(self.next());
        lock(&self.state).overlays.insert(id.0, html.to_string());
        Ok(id)
    }

    fn open_info_overlay(&self, overlay: OverlayId, map: MapId, marker: MarkerId) {
        lock(&self.state).opened.push((overlay, map, marker));
    }

    fn close_info_overlay(&self, overlay: OverlayId) {
        lock(&self.state).overlays.remove(&overlay.0);
    }

    fn on_marker_click(&self, marker: MarkerId, handler: ClickHandler) {
        lock(&self.state).handlers.insert(marker, Arc::new(handler));
    }
}
