//! Customer-facing delivery map: reconcile a location, load the provider, bind.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use super::controller::{MapBinding, MapViewController};
use super::host::ContainerId;
use crate::error::{StatusSlot, TrackError};
use crate::location::DeliveryLocation;
use crate::reconciler::LocationSourceReconciler;

#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    pub pincode: String,
    pub address: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum ViewState {
    Loading,
    Error(String),
    Ready(DeliveryLocation),
}

pub struct DeliveryMapView {
    controller: Arc<MapViewController>,
    reconciler: Arc<LocationSourceReconciler>,
    status: StatusSlot,
    state: watch::Sender<ViewState>,
}

impl DeliveryMapView {
    pub fn new(controller: Arc<MapViewController>, reconciler: Arc<LocationSourceReconciler>) -> Self {
        let (state, _) = watch::channel(ViewState::Loading);
        Self {
            controller,
            reconciler,
            status: StatusSlot::new(),
            state,
        }
    }

    pub fn controller(&self) -> &Arc<MapViewController> {
        &self.controller
    }

    pub fn status_slot(&self) -> &StatusSlot {
        &self.status
    }

    pub fn state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    /// Render into `container`. Always ends in `Ready` or `Error`.
    pub async fn render(&self, container: &ContainerId, request: &RenderRequest) -> ViewState {
        self.state.send_replace(ViewState::Loading);
        self.controller.start_suppression();

        let outcome = self.resolve_and_bind(container, request).await;
        let next = match outcome {
            Ok(binding) => {
                self.status.clear();
                ViewState::Ready(binding.location)
            }
            Err(e) => {
                tracing::warn!(container = %container, pincode = %request.pincode, error = %e, "Delivery map failed");
                self.status.report(&e);
                ViewState::Error(e.to_string())
            }
        };
        self.state.send_replace(next.clone());
        next
    }

    async fn resolve_and_bind(
        &self,
        container: &ContainerId,
        request: &RenderRequest,
    ) -> Result<MapBinding, TrackError> {
        if request.pincode.trim().is_empty() {
            return Err(TrackError::MissingPincode);
        }

        let (location, loaded) = tokio::join!(
            self.reconciler.resolve(
                request.order_id.as_deref(),
                &request.pincode,
                request.address.as_deref(),
            ),
            self.controller.load_provider(),
        );
        let location = location?;
        loaded?;

        self.controller.bind(
            container,
            &location,
            request.pincode.trim(),
            request.address.as_deref(),
        )
    }
}
