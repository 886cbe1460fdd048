use crate::config::DetectionServiceConfig;
use crate::detection::DetectionResult;
use crate::intake::StagedFile;
use bytes::Bytes;
use std::future::Future;
use std::io::Read;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::instrument;

/// What the detection service sent back. The server picks the shape.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResponse {
    Report(Bytes),
    Result(DetectionResult),
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Detection service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to reach detection service: {0}")]
    Transport(String),
    #[error("Failed to read detection response: {0}")]
    Read(#[from] std::io::Error),
    #[error("Malformed detection result: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Detection task failed: {0}")]
    Join(String),
}

impl SubmitError {
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::Status { .. } => "status",
            SubmitError::Transport(_) => "transport",
            SubmitError::Read(_) => "read",
            SubmitError::Payload(_) => "payload",
            SubmitError::Join(_) => "join",
        }
    }
}

pub trait DetectionService: Send + Sync + 'static {
    fn detect(
        &self,
        file: StagedFile,
    ) -> impl Future<Output = Result<DetectionResponse, SubmitError>> + Send;
}

/// Posts staged files to the remote `/detect` endpoint as multipart form data.
#[derive(Clone)]
pub struct HttpDetectionService {
    agent: ureq::Agent,
    endpoint: String,
    field_name: String,
}

impl HttpDetectionService {
    pub fn new(config: &DetectionServiceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Self {
            agent,
            endpoint: config.get_endpoint(),
            field_name: config.field_name.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post(&self, file: &StagedFile) -> Result<DetectionResponse, SubmitError> {
        let boundary = boundary_for(boundary_seed(), file.data());
        let body = multipart_body(&boundary, &self.field_name, file);

        let response = match self
            .agent
            .post(&self.endpoint)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(SubmitError::Status { status, body });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(SubmitError::Transport(transport.to_string()));
            }
        };

        let content_type = response.content_type().to_ascii_lowercase();
        tracing::debug!(
            status = response.status(),
            content_type = %content_type,
            "detection service responded"
        );

        if is_json(&content_type) {
            let result: DetectionResult = serde_json::from_reader(response.into_reader())?;
            tracing::debug!("Received {} detections", result.detections.len());
            Ok(DetectionResponse::Result(result))
        } else {
            let mut buf = Vec::new();
            response.into_reader().read_to_end(&mut buf)?;
            tracing::debug!("Received {} byte report", buf.len());
            Ok(DetectionResponse::Report(Bytes::from(buf)))
        }
    }
}

impl DetectionService for HttpDetectionService {
    #[instrument(skip(self, file), fields(endpoint = %self.endpoint, file = %file.name()))]
    async fn detect(&self, file: StagedFile) -> Result<DetectionResponse, SubmitError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.post(&file))
            .await
            .map_err(|e| SubmitError::Join(e.to_string()))?
    }
}

fn is_json(content_type: &str) -> bool {
    content_type == "application/json" || content_type.ends_with("+json")
}

fn boundary_seed() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// Picks a boundary that does not occur anywhere in `data`.
fn boundary_for(seed: u128, data: &[u8]) -> String {
    let mut attempt = 0u32;
    loop {
        let boundary = format!("----ppe-client-{:x}-{}", seed, attempt);
        if !data
            .windows(boundary.len())
            .any(|window| window == boundary.as_bytes())
        {
            return boundary;
        }
        attempt += 1;
    }
}

fn escape_filename(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>()
        .replace('"', "%22")
}

/// Single-part `multipart/form-data` body carrying `file` under `field_name`.
pub fn multipart_body(boundary: &str, field_name: &str, file: &StagedFile) -> Vec<u8> {
    let part_header = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
        boundary,
        field_name,
        escape_filename(file.name()),
        file.media_type(),
    );
    let closing = format!("\r\n--{}--\r\n", boundary);

    let mut body = Vec::with_capacity(part_header.len() + file.data().len() + closing.len());
    body.extend_from_slice(part_header.as_bytes());
    body.extend_from_slice(file.data());
    body.extend_from_slice(closing.as_bytes());
    body
}
