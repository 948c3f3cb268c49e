//! Liveness endpoint

use axum::http::StatusCode;

/// Liveness handler, answers `ok` while the process serves requests
pub async fn live() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
