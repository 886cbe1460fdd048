use crate::{client::DetectionService, server::SharedState, session::SessionView};
use axum::{extract::State, response::Json};
use tracing::instrument;

pub async fn session_view<S: DetectionService>(
    State(state): State<SharedState<S>>,
) -> Json<SessionView> {
    Json(state.session.lock().view())
}

#[instrument(skip(state))]
pub async fn reset<S: DetectionService>(State(state): State<SharedState<S>>) -> Json<SessionView> {
    let mut session = state.session.lock();
    session.reset();
    tracing::info!(cycle = session.cycle(), "Session reset");
    Json(session.view())
}
