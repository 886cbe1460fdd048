use crate::{client::DetectionService, server::SharedState};
use axum::{extract::State, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    analyzing: bool,
}

pub async fn healthcheck<S: DetectionService>(State(state): State<SharedState<S>>) -> Json<Health> {
    Json(Health {
        status: "Available",
        analyzing: state.session.lock().is_analyzing(),
    })
}
