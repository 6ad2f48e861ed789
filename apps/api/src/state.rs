use rolebridge_application::{LinkingService, ReconciliationService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub linking_service: LinkingService,
    pub reconciliation_service: ReconciliationService,
    pub notifier_shared_secret: String,
}
