//! Customer-side delivery map.
//!
//! The page and the third-party widget sit behind [`HostDocument`] and
//! [`MapWidgetApi`]; [`headless`] provides in-process versions of both.

pub mod controller;
pub mod headless;
pub mod host;
pub mod registry;
pub mod suppression;
pub mod view;

pub use controller::{MapBinding, MapState, MapViewController};
pub use headless::{HeadlessDocument, RecordingWidget};
pub use host::{ContainerId, HostDocument, MapWidgetApi, ScriptEvent};
pub use registry::ScriptLoadRegistry;
pub use suppression::{OverlaySuppressor, SuppressionRule};
pub use view::{DeliveryMapView, RenderRequest, ViewState};
