//! Seams to the page hosting the map and to the third-party widget API.
//!
//! The widget API only exists after its provider script has loaded;
//! [`HostDocument::widget_api`] returns `None` until then.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Handle to the element a map is rendered into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ElementId(pub u64);

/// What the page reports about one script tag's load.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptEvent {
    Loaded,
    Failed(String),
}

/// A page element as seen by the overlay scrubber.
#[derive(Debug, Clone)]
pub struct OverlayElement {
    pub id: ElementId,
    /// Inline `style` attribute.
    pub style: String,
    pub text: String,
    pub hidden: bool,
}

pub trait HostDocument: Send + Sync {
    /// Whether a script tag with this source is already in the page.
    fn script_present(&self, url: &str) -> bool;

    /// The widget's global namespace, once its script has run.
    fn widget_api(&self) -> Option<Arc<dyn MapWidgetApi>>;

    /// Append a script tag; the receiver fires on its load or error event.
    fn inject_script(&self, url: &str) -> oneshot::Receiver<ScriptEvent>;

    /// One-shot listener on an existing script tag.
    fn on_script_event(&self, url: &str) -> oneshot::Receiver<ScriptEvent>;

    /// Candidate `div`s for the scrubber.
    fn overlay_elements(&self) -> Vec<OverlayElement>;

    /// Hide without removing: display none, hidden visibility, zero opacity, no pointer events.
    fn hide_element(&self, id: ElementId);

    /// Signals on every subtree mutation of the page body. Drop to disconnect.
    fn observe_mutations(&self) -> mpsc::UnboundedReceiver<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOptions {
    pub center: LatLng,
    pub zoom: u8,
    pub map_type: String,
    pub hide_poi_labels: bool,
    pub gesture_handling: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerStyle {
    pub scale: f64,
    pub fill_color: String,
    pub fill_opacity: f64,
    pub stroke_color: String,
    pub stroke_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerOptions {
    pub position: LatLng,
    /// Always a filled circle.
    pub style: MarkerStyle,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MapId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OverlayId(pub u64);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct WidgetError(pub String);

pub type ClickHandler = Box<dyn Fn() + Send + Sync>;

/// Constructors the widget exposes on its global namespace.
pub trait MapWidgetApi: Send + Sync {
    fn create_map(&self, container: &ContainerId, options: &MapOptions) -> Result<MapId, WidgetError>;

    fn set_center(&self, map: MapId, center: LatLng, zoom: u8) -> Result<(), WidgetError>;

    fn add_marker(&self, map: MapId, options: &MarkerOptions) -> Result<MarkerId, WidgetError>;

    fn remove_marker(&self, marker: MarkerId);

    fn create_info_overlay(&self, html: &str) -> Result<OverlayId, WidgetError>;

    fn open_info_overlay(&self, overlay: OverlayId, map: MapId, marker: MarkerId);

    /// Close and release an overlay. Unknown ids are ignored.
    fn close_info_overlay(&self, overlay: OverlayId);

    fn on_marker_click(&self, marker: MarkerId, handler: ClickHandler);
}
