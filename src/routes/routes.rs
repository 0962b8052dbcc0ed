use crate::handlers::{content_handlers, file_handlers, health_handlers};
use crate::state::AppState;
use axum::Router;
use axum::routing::get;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health_handlers::healthz))
        .route("/readyz", get(health_handlers::readyz))
        .route(
            "/files",
            get(file_handlers::list_files).post(file_handlers::upload_file),
        )
        .route(
            "/files/{id}",
            get(file_handlers::get_file)
                .patch(file_handlers::update_file)
                .delete(file_handlers::delete_file),
        )
        .route("/files/{id}/download", get(file_handlers::download_file))
        .route(
            "/content",
            get(content_handlers::list_contents).post(content_handlers::create_content),
        )
        .route("/content/{id}", get(content_handlers::get_content))
}
