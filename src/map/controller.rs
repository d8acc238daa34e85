//! Map lifecycle for one host document.
//!
//! State: Uninitialized → ScriptLoading → Ready → Bound, with Error reachable
//! from anywhere. Rebinding a container replaces its marker and info overlay;
//! the map itself is recentered, not recreated, even after a failed bind.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::host::{
    ContainerId, HostDocument, LatLng, MapId, MapOptions, MapWidgetApi, MarkerId, MarkerOptions, MarkerStyle,
    OverlayId, WidgetError,
};
use super::registry::ScriptLoadRegistry;
use super::suppression::{self, OverlaySuppressor, SuppressionRule};
use crate::error::TrackError;
use crate::location::DeliveryLocation;
use crate::tracking::lock;

pub const DEFAULT_ZOOM: u8 = 15;
pub const MARKER_TITLE: &str = "Delivery Location";
pub const AUTH_FAILURE_MESSAGE: &str = "Map provider rejected the credential";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum MapState {
    Uninitialized,
    ScriptLoading,
    Ready,
    Bound(DeliveryLocation),
    Error(String),
}

/// What is on screen for one container.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapBinding {
    pub container: ContainerId,
    pub map: MapId,
    pub marker: MarkerId,
    pub overlay: OverlayId,
    pub location: DeliveryLocation,
    pub info_html: String,
}

pub struct MapViewController {
    document: Arc<dyn HostDocument>,
    registry: Arc<ScriptLoadRegistry>,
    script_url: String,
    rule: SuppressionRule,
    state: watch::Sender<MapState>,
    bindings: Mutex<HashMap<ContainerId, MapBinding>>,
    maps: Mutex<HashMap<ContainerId, MapId>>,
    suppressor: Mutex<Option<OverlaySuppressor>>,
}

impl MapViewController {
    /// Controller sharing the process-wide script registry.
    pub fn new(document: Arc<dyn HostDocument>, script_url: impl Into<String>) -> Self {
        Self::with_registry(document, script_url, ScriptLoadRegistry::global())
    }

    pub fn with_registry(
        document: Arc<dyn HostDocument>,
        script_url: impl Into<String>,
        registry: Arc<ScriptLoadRegistry>,
    ) -> Self {
        let (state, _) = watch::channel(MapState::Uninitialized);
        Self {
            document,
            registry,
            script_url: script_url.into(),
            rule: SuppressionRule::default(),
            state,
            bindings: Mutex::new(HashMap::new()),
            maps: Mutex::new(HashMap::new()),
            suppressor: Mutex::new(None),
        }
    }

    pub fn state(&self) -> MapState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MapState> {
        self.state.subscribe()
    }

    pub fn binding(&self, container: &ContainerId) -> Option<MapBinding> {
        lock(&self.bindings).get(container).cloned()
    }

    /// Ensure the provider script is loaded.
    pub async fn load_provider(&self) -> Result<(), TrackError> {
        if matches!(self.state(), MapState::Ready | MapState::Bound(_)) {
            return Ok(());
        }
        self.state.send_replace(MapState::ScriptLoading);

        match self.registry.load(&self.script_url, &*self.document).await {
            Ok(()) => {
                self.state.send_if_modified(|s| {
                    if *s == MapState::ScriptLoading {
                        *s = MapState::Ready;
                        true
                    } else {
                        false
                    }
                });
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(MapState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Show `location` in `container` with one marker and an open info overlay.
    ///
    /// Calls for the same container must not overlap.
    pub fn bind(
        &self,
        container: &ContainerId,
        location: &DeliveryLocation,
        pincode: &str,
        fallback_address: Option<&str>,
    ) -> Result<MapBinding, TrackError> {
        if !matches!(self.state(), MapState::Ready | MapState::Bound(_)) {
            return Err(TrackError::MapNotReady);
        }
        let api = self.document.widget_api().ok_or(TrackError::MapNotReady)?;

        self.scrub_once();

        let previous = lock(&self.bindings).remove(container);
        let info_html = info_html(location, pincode, fallback_address);
        let binding = match self.place(&api, container, previous.as_ref(), location, &info_html) {
            Ok((map, marker, overlay)) => MapBinding {
                container: container.clone(),
                map,
                marker,
                overlay,
                location: location.clone(),
                info_html,
            },
            Err(e) => {
                let err = TrackError::MapInit(e.0);
                tracing::error!(container = %container, error = %err, "Map binding failed");
                self.state.send_replace(MapState::Error(err.to_string()));
                return Err(err);
            }
        };

        tracing::info!(
            container = %container,
            lat = location.latitude,
            lng = location.longitude,
            source = %location.source,
            "Delivery location bound"
        );
        lock(&self.bindings).insert(container.clone(), binding.clone());
        self.state.send_replace(MapState::Bound(location.clone()));
        Ok(binding)
    }

    fn place(
        &self,
        api: &Arc<dyn MapWidgetApi>,
        container: &ContainerId,
        previous: Option<&MapBinding>,
        location: &DeliveryLocation,
        info_html: &str,
    ) -> Result<(MapId, MarkerId, OverlayId), WidgetError> {
        let center = LatLng {
            lat: location.latitude,
            lng: location.longitude,
        };

        if let Some(prev) = previous {
            api.remove_marker(prev.marker);
            api.close_info_overlay(prev.overlay);
        }

        let existing = lock(&self.maps).get(container).copied();
        let map = match existing {
            Some(map) => {
                api.set_center(map, center, DEFAULT_ZOOM)?;
                map
            }
            None => {
                let map = api.create_map(container, &map_options(center))?;
                lock(&self.maps).insert(container.clone(), map);
                map
            }
        };

        let marker = api.add_marker(map, &marker_options(center))?;
        let overlay = match api.create_info_overlay(info_html) {
            Ok(overlay) => overlay,
            Err(e) => {
                api.remove_marker(marker);
                return Err(e);
            }
        };

        let reopen = Arc::clone(api);
        api.on_marker_click(
            marker,
            Box::new(move || reopen.open_info_overlay(overlay, map, marker)),
        );
        api.open_info_overlay(overlay, map, marker);
        Ok((map, marker, overlay))
    }

    /// Start the overlay watcher if it is not already running.
    pub fn start_suppression(&self) {
        let mut slot = lock(&self.suppressor);
        if slot.as_ref().is_some_and(OverlaySuppressor::is_running) {
            return;
        }
        *slot = Some(OverlaySuppressor::spawn(Arc::clone(&self.document), self.rule.clone()));
    }

    pub fn is_suppressing(&self) -> bool {
        lock(&self.suppressor).as_ref().is_some_and(OverlaySuppressor::is_running)
    }

    pub fn scrub_once(&self) -> usize {
        suppression::scrub(&*self.document, &self.rule)
    }

    /// Called when the provider reports the credential was rejected.
    pub fn report_auth_failure(&self) {
        tracing::error!("Map provider authentication failed");
        self.state.send_replace(MapState::Error(AUTH_FAILURE_MESSAGE.to_string()));
        self.scrub_once();
    }

    /// Stop the watcher and release the container's marker and overlay. The script stays loaded.
    pub async fn teardown(&self, container: &ContainerId) {
        let suppressor = lock(&self.suppressor).take();
        if let Some(suppressor) = suppressor {
            suppressor.stop().await;
        }
        lock(&self.maps).remove(container);
        let binding = lock(&self.bindings).remove(container);
        if let Some(binding) = binding {
            if let Some(api) = self.document.widget_api() {
                api.remove_marker(binding.marker);
                api.close_info_overlay(binding.overlay);
            }
            tracing::debug!(container = %container, "Map binding removed");
        }
    }
}

fn map_options(center: LatLng) -> MapOptions {
    MapOptions {
        center,
        zoom: DEFAULT_ZOOM,
        map_type: "roadmap".into(),
        hide_poi_labels: true,
        gesture_handling: "cooperative".into(),
    }
}

fn marker_options(position: LatLng) -> MarkerOptions {
    MarkerOptions {
        position,
        style: MarkerStyle {
            scale: 10.0,
            fill_color: "#34A853".into(),
            fill_opacity: 1.0,
            stroke_color: "#ffffff".into(),
            stroke_weight: 3.0,
        },
        title: MARKER_TITLE.into(),
    }
}

/// Overlay body: the best address we have, then the pincode.
pub fn info_html(location: &DeliveryLocation, pincode: &str, fallback_address: Option<&str>) -> String {
    let headline = location
        .address
        .as_deref()
        .filter(|a| !a.is_empty())
        .or(fallback_address.filter(|a| !a.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Pincode: {}", pincode));
    format!(
        concat!(
            "<div style=\"padding: 8px; min-width: 200px;\">",
            "<strong style=\"color: #34A853; font-size: 14px;\">{}</strong><br/>",
            "<p style=\"margin: 4px 0; color: #333; font-size: 13px;\">{}</p>",
            "<p style=\"margin: 4px 0; color: #666; font-size: 12px;\">Pincode: {}</p>",
            "</div>"
        ),
        MARKER_TITLE,
        escape_html(&headline),
        escape_html(pincode),
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
