use super::error_response;
use crate::{
    client::DetectionService,
    detection::ResultView,
    render::{self, AnnotatedImage, RenderError},
    server::SharedState,
    session::SessionError,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum ResultError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Render(#[from] RenderError),
    #[error("Render task failed: {0}")]
    Join(String),
    #[error("HTTP builder failed: {0}")]
    HttpBuilder(String),
}

impl IntoResponse for ResultError {
    fn into_response(self) -> Response {
        let status = match &self {
            ResultError::Session(SessionError::NoResult)
            | ResultError::Session(SessionError::NoFileStaged) => StatusCode::NOT_FOUND,
            ResultError::Session(SessionError::AlreadyAnalyzing) => StatusCode::CONFLICT,
            ResultError::Render(RenderError::Decode(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ResultError::Render(_) | ResultError::Join(_) | ResultError::HttpBuilder(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self)
    }
}

#[instrument(skip(state))]
pub async fn result_view<S: DetectionService>(
    State(state): State<SharedState<S>>,
) -> Result<Json<ResultView>, ResultError> {
    let session = state.session.lock();
    let result = session.result().ok_or(SessionError::NoResult)?;
    Ok(Json(ResultView::new(result, &state.render_config)))
}

/// Redraws the staged image with the current result's boxes on every call.
#[instrument(skip(state))]
pub async fn annotated_image<S: DetectionService>(
    State(state): State<SharedState<S>>,
) -> Result<Response, ResultError> {
    let (file, result) = state.session.lock().render_inputs()?;
    let style = state.render_style.clone();

    let png = tokio::task::spawn_blocking(move || {
        let background = render::decode(&file)?;
        AnnotatedImage::render(&background, &result, &style).to_png()
    })
    .await
    .map_err(|e| ResultError::Join(e.to_string()))?
    .inspect_err(|e| tracing::warn!("Rendering aborted: {}", e))?;

    Response::builder()
        .header(header::CONTENT_TYPE, "image/png")
        .header(header::CACHE_CONTROL, "no-store")
        .body(axum::body::Body::from(png))
        .map_err(|e| ResultError::HttpBuilder(e.to_string()))
}
