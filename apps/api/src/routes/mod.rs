pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    response::Html,
    routing::{get, post},
    Router,
};

use crate::assessment::handlers;
use crate::extraction::MAX_UPLOAD_BYTES;
use crate::state::AppState;

/// Multipart framing overhead allowed on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

/// GET /
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/assessments",
            post(handlers::handle_assess)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD_BYTES)),
        )
        .route("/api/v1/assessments/export", post(handlers::handle_export))
        .with_state(state)
}
