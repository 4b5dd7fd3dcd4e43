use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::header,
    response::IntoResponse,
    routing::{get, post},
};

use crate::web::{AppState, essays, history};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/check-essay", post(essays::check_essay))
        .route("/api/upload-file", post(essays::upload_file))
        .route(
            "/api/history",
            get(history::list_history).delete(history::clear_history),
        )
        .route(
            "/api/history/:id",
            get(history::history_detail).delete(history::delete_history),
        )
        .route("/api/history/:id/export", get(history::export_history))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "OK")
}
