use std::sync::Arc;

use geoperms_application::{PermissionGateway, SubjectDirectory};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: PermissionGateway,
    pub directory: Arc<dyn SubjectDirectory>,
}
