use crate::services::cloud_file_service::CloudFileService;
use crate::views::Views;
use crate::views::geo::DistanceUnit;
use std::sync::Arc;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub files: CloudFileService,
    pub views: Arc<Views>,
    pub distance_unit: DistanceUnit,
}
