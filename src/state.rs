use std::sync::Arc;

use crate::integrations::IntegrationFactory;
use crate::jobs::JobQueue;
use crate::services::dimension_slices::DimensionSlicesRunner;
use crate::store::Stores;

/// Shared application state cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub queue: Arc<dyn JobQueue>,
    pub integrations: Arc<dyn IntegrationFactory>,
    pub slice_runner: Arc<DimensionSlicesRunner>,
}

impl AppState {
    pub fn new(
        stores: Stores,
        queue: Arc<dyn JobQueue>,
        integrations: Arc<dyn IntegrationFactory>,
    ) -> Self {
        let slice_runner = Arc::new(DimensionSlicesRunner::new(
            stores.clone(),
            integrations.clone(),
        ));
        Self {
            stores,
            queue,
            integrations,
            slice_runner,
        }
    }
}
