//! Per-session state for one user: the staged file, the current detection
//! result and the analyzing flag.
//!
//! Every transition that invalidates an in-flight submission (new file, clear,
//! reset) starts a new cycle. A response tagged with an older cycle is
//! dropped instead of being applied to unrelated state.

use crate::client::{DetectionResponse, SubmitError};
use crate::config::IntakeConfig;
use crate::detection::DetectionResult;
use crate::intake::{CandidateFile, FileIntake, InputPath, IntakeError, MediaType, StagedFile};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub const SUBMIT_LABEL: &str = "Analyze Image";
pub const SUBMIT_LABEL_BUSY: &str = "Analyzing...";
pub const UPLOAD_FAILED_MESSAGE: &str = "There was an error uploading the file. Please try again.";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("No file staged for analysis.")]
    NoFileStaged,
    #[error("An analysis is already in progress.")]
    AlreadyAnalyzing,
    #[error("No detection result available.")]
    NoResult,
}

/// Issued when a submission starts; hands the file to the network call and
/// remembers which cycle the answer belongs to.
#[derive(Debug, Clone)]
pub struct SubmissionTicket {
    pub cycle: u64,
    pub file: StagedFile,
}

/// How a finished submission was applied to the session.
#[derive(Debug, PartialEq)]
pub enum Completion {
    Stored(DetectionResult),
    Download(Bytes),
    Failed(String),
    Stale,
}

#[derive(Debug, Default)]
pub struct AnalysisSession {
    intake: FileIntake,
    result: Option<DetectionResult>,
    analyzing: bool,
    cycle: u64,
}

impl AnalysisSession {
    pub fn new(config: IntakeConfig) -> Self {
        Self {
            intake: FileIntake::new(config),
            ..Default::default()
        }
    }

    pub fn staged(&self) -> Option<&StagedFile> {
        self.intake.staged()
    }

    pub fn result(&self) -> Option<&DetectionResult> {
        self.result.as_ref()
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn intake(&self) -> &FileIntake {
        &self.intake
    }

    pub fn intake_mut(&mut self) -> &mut FileIntake {
        &mut self.intake
    }

    pub fn select_file(
        &mut self,
        path: InputPath,
        candidate: Option<CandidateFile>,
    ) -> Result<Option<&StagedFile>, IntakeError> {
        let replaced = self.intake.receive(path, candidate)?.is_some();
        if !replaced {
            return Ok(None);
        }
        self.start_cycle();
        Ok(self.intake.staged())
    }

    pub fn clear(&mut self) {
        self.intake.clear();
        self.start_cycle();
    }

    /// Back to the pre-analysis state: no result, no staged file.
    pub fn reset(&mut self) {
        self.clear();
    }

    fn start_cycle(&mut self) {
        self.cycle += 1;
        self.analyzing = false;
        self.result = None;
    }

    pub fn begin_submission(&mut self) -> Result<SubmissionTicket, SessionError> {
        let file = self.intake.staged().ok_or(SessionError::NoFileStaged)?.clone();
        if self.analyzing {
            return Err(SessionError::AlreadyAnalyzing);
        }

        self.analyzing = true;
        self.result = None;

        Ok(SubmissionTicket {
            cycle: self.cycle,
            file,
        })
    }

    pub fn complete_submission(
        &mut self,
        cycle: u64,
        outcome: Result<DetectionResponse, SubmitError>,
    ) -> Completion {
        if cycle != self.cycle {
            tracing::warn!(
                response_cycle = cycle,
                current_cycle = self.cycle,
                "Discarding stale detection response"
            );
            return Completion::Stale;
        }

        self.analyzing = false;
        match outcome {
            Ok(DetectionResponse::Result(result)) => {
                self.result = Some(result.clone());
                Completion::Stored(result)
            }
            Ok(DetectionResponse::Report(report)) => Completion::Download(report),
            Err(e) => {
                tracing::error!("Error uploading file: {}", e);
                Completion::Failed(UPLOAD_FAILED_MESSAGE.to_string())
            }
        }
    }

    /// Clears the analyzing flag of a submission that never completed.
    pub fn abandon_submission(&mut self, cycle: u64) {
        if cycle == self.cycle && self.analyzing {
            tracing::warn!(cycle, "Submission abandoned before completion");
            self.analyzing = false;
        }
    }

    /// Staged file and result of the current cycle, when both exist.
    pub fn render_inputs(&self) -> Result<(StagedFile, DetectionResult), SessionError> {
        let result = self.result.clone().ok_or(SessionError::NoResult)?;
        let file = self.intake.staged().ok_or(SessionError::NoFileStaged)?.clone();
        Ok((file, result))
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            cycle: self.cycle,
            staged: self.intake.staged().map(StagedFileView::from),
            dragging: self.intake.is_dragging(),
            input_revision: self.intake.input_revision(),
            analyzing: self.analyzing,
            submit_label: if self.analyzing {
                SUBMIT_LABEL_BUSY
            } else {
                SUBMIT_LABEL
            },
            submit_enabled: self.intake.staged().is_some() && !self.analyzing,
            has_result: self.result.is_some(),
        }
    }
}

/// Keeps the analyzing flag honest for a submission whose caller may go away.
/// Dropping it without calling `complete` abandons the submission.
pub struct InFlightSubmission {
    session: Arc<Mutex<AnalysisSession>>,
    cycle: u64,
    finished: bool,
}

impl InFlightSubmission {
    /// Starts a submission on `session`, returning the file to upload.
    pub fn start(session: Arc<Mutex<AnalysisSession>>) -> Result<(Self, StagedFile), SessionError> {
        let ticket = session.lock().begin_submission()?;
        let in_flight = Self {
            session,
            cycle: ticket.cycle,
            finished: false,
        };
        Ok((in_flight, ticket.file))
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn complete(mut self, outcome: Result<DetectionResponse, SubmitError>) -> Completion {
        self.finished = true;
        self.session.lock().complete_submission(self.cycle, outcome)
    }
}

impl Drop for InFlightSubmission {
    fn drop(&mut self) {
        if !self.finished {
            self.session.lock().abandon_submission(self.cycle);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedFileView {
    pub name: String,
    pub media_type: MediaType,
    pub size: u64,
    pub display_size: String,
}

impl From<&StagedFile> for StagedFileView {
    fn from(file: &StagedFile) -> Self {
        Self {
            name: file.name().to_string(),
            media_type: file.media_type(),
            size: file.size(),
            display_size: file.display_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub cycle: u64,
    pub staged: Option<StagedFileView>,
    pub dragging: bool,
    pub input_revision: u64,
    pub analyzing: bool,
    pub submit_label: &'static str,
    pub submit_enabled: bool,
    pub has_result: bool,
}
