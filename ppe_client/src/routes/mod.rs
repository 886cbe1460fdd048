mod analyze;
mod health;
mod intake;
mod metrics;
mod result;
mod session;

use crate::{client::DetectionService, server::SharedState};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::fmt::Display;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// JSON `{"error": ...}` body shared by every failing route.
fn error_response(status: StatusCode, error: impl Display) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
        .into_response()
}

pub fn api_routes<S: DetectionService>() -> Router<SharedState<S>> {
    Router::new()
        .route("/health", get(health::healthcheck::<S>))
        .route("/metrics", get(metrics::metrics_handler::<S>))
        .route("/session", get(session::session_view::<S>))
        .route("/reset", post(session::reset::<S>))
        .route(
            "/file",
            post(intake::select_file::<S>).delete(intake::clear_file::<S>),
        )
        .route("/drag/enter", post(intake::drag_enter::<S>))
        .route("/drag/over", post(intake::drag_over::<S>))
        .route("/drag/leave", post(intake::drag_leave::<S>))
        .route("/analyze", post(analyze::analyze::<S>))
        .route("/result", get(result::result_view::<S>))
        .route("/result/annotated.png", get(result::annotated_image::<S>))
}
