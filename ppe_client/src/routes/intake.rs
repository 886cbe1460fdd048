use super::error_response;
use crate::{
    client::DetectionService,
    intake::{CandidateFile, InputPath, IntakeError},
    server::SharedState,
    session::SessionView,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum SelectFileError {
    #[error(transparent)]
    Rejected(#[from] IntakeError),
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
}

impl IntoResponse for SelectFileError {
    fn into_response(self) -> Response {
        let status = match &self {
            SelectFileError::Rejected(IntakeError::UnsupportedMediaType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            SelectFileError::Rejected(IntakeError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            SelectFileError::Multipart(e) => e.status(),
        };
        error_response(status, self)
    }
}

#[derive(Debug, Default, Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Browse,
    Drop,
}

#[derive(Debug, Default, Deserialize)]
pub struct SelectParams {
    #[serde(default)]
    source: Source,
}

impl From<Source> for InputPath {
    fn from(source: Source) -> Self {
        match source {
            Source::Browse => InputPath::Browse,
            Source::Drop => InputPath::Drop,
        }
    }
}

async fn read_candidate(multipart: &mut Multipart) -> Result<Option<CandidateFile>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("uploaded_image").to_string();
        let media_type = field.content_type().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        return Ok(Some(CandidateFile::new(name, media_type, data)));
    }
    Ok(None)
}

fn declared_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or_default()
}

fn reject<S: DetectionService>(state: &SharedState<S>, error: IntakeError) -> SelectFileError {
    let reason = match &error {
        IntakeError::UnsupportedMediaType(_) => "unsupported_media_type",
        IntakeError::TooLarge { .. } => "too_large",
    };
    tracing::warn!("Rejected file: {}", error);
    state.metrics.record_rejected_file(reason);
    error.into()
}

#[instrument(skip(state, headers, multipart))]
pub async fn select_file<S: DetectionService>(
    State(state): State<SharedState<S>>,
    Query(params): Query<SelectParams>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<SessionView>, SelectFileError> {
    let candidate = match read_candidate(&mut multipart).await {
        Ok(candidate) => candidate,
        // The body limit cut the upload short: reject it like any oversize file.
        Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            let error = state
                .session
                .lock()
                .intake()
                .oversize_error(declared_length(&headers));
            return Err(reject(&state, error));
        }
        Err(e) => return Err(e.into()),
    };

    let mut session = state.session.lock();
    match session.select_file(params.source.into(), candidate) {
        Ok(Some(staged)) => {
            tracing::info!(
                name = staged.name(),
                size = staged.size(),
                "Staged file for analysis"
            );
        }
        Ok(None) => tracing::debug!("Selection event without a file"),
        Err(e) => return Err(reject(&state, e)),
    }

    Ok(Json(session.view()))
}

#[instrument(skip(state))]
pub async fn clear_file<S: DetectionService>(
    State(state): State<SharedState<S>>,
) -> Json<SessionView> {
    let mut session = state.session.lock();
    session.clear();
    Json(session.view())
}

pub async fn drag_enter<S: DetectionService>(
    State(state): State<SharedState<S>>,
) -> Json<SessionView> {
    let mut session = state.session.lock();
    session.intake_mut().drag_enter();
    Json(session.view())
}

pub async fn drag_over<S: DetectionService>(
    State(state): State<SharedState<S>>,
) -> Json<SessionView> {
    let mut session = state.session.lock();
    session.intake_mut().drag_over();
    Json(session.view())
}

pub async fn drag_leave<S: DetectionService>(
    State(state): State<SharedState<S>>,
) -> Json<SessionView> {
    let mut session = state.session.lock();
    session.intake_mut().drag_leave();
    Json(session.view())
}
