use std::sync::Arc;

use crate::location::AddressResolver;
use crate::reconciler::LocationSourceReconciler;

pub struct AppState {
    pub reconciler: Arc<LocationSourceReconciler>,
    pub resolver: Arc<AddressResolver>,
}
