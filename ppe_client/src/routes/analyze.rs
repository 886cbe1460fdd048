use super::error_response;
use crate::{
    client::DetectionService,
    detection::ResultView,
    server::SharedState,
    session::{Completion, InFlightSubmission, SessionError},
};
use axum::{
    http::{header, StatusCode},
    extract::State,
    response::{IntoResponse, Json, Response},
};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Upload(String),
    #[error("The session changed while the analysis was running; the result was discarded.")]
    Stale,
    #[error("HTTP builder failed: {0}")]
    HttpBuilder(String),
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let status = match &self {
            AnalyzeError::Session(SessionError::NoFileStaged) => StatusCode::BAD_REQUEST,
            AnalyzeError::Session(SessionError::AlreadyAnalyzing) => StatusCode::CONFLICT,
            AnalyzeError::Session(SessionError::NoResult) => StatusCode::NOT_FOUND,
            AnalyzeError::Upload(_) => StatusCode::BAD_GATEWAY,
            AnalyzeError::Stale => StatusCode::CONFLICT,
            AnalyzeError::HttpBuilder(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self)
    }
}

fn outcome_label(completion: &Completion) -> &'static str {
    match completion {
        Completion::Stored(_) => "stored",
        Completion::Download(_) => "download",
        Completion::Failed(_) => "failed",
        Completion::Stale => "stale",
    }
}

#[instrument(skip(state))]
pub async fn analyze<S: DetectionService>(
    State(state): State<SharedState<S>>,
) -> Result<Response, AnalyzeError> {
    let (in_flight, file) = InFlightSubmission::start(state.session.clone())?;
    tracing::info!(
        cycle = in_flight.cycle(),
        name = file.name(),
        "Submitting file for detection"
    );

    let started = Instant::now();
    let outcome = state.detection_service.detect(file).await;
    let completion = in_flight.complete(outcome);

    let label = outcome_label(&completion);
    let elapsed_ms = started.elapsed().as_millis() as u64;
    state.metrics.record_submission(label);
    state.metrics.record_submission_duration(elapsed_ms, label);
    tracing::info!(outcome = label, elapsed_ms, "Detection submission finished");

    match completion {
        Completion::Stored(result) => {
            Ok(Json(ResultView::new(&result, &state.render_config)).into_response())
        }
        Completion::Download(report) => Response::builder()
            .header(header::CONTENT_TYPE, "application/pdf")
            .header(
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}\"",
                    state.report_config.download_filename
                ),
            )
            .body(axum::body::Body::from(report))
            .map_err(|e| AnalyzeError::HttpBuilder(e.to_string())),
        Completion::Failed(message) => Err(AnalyzeError::Upload(message)),
        Completion::Stale => Err(AnalyzeError::Stale),
    }
}
