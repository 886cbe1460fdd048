//! File intake: the single staged-file slot fed by the browse and drop paths.
//!
//! Validation only looks at the declared media type (and the size ceiling when
//! enforced). A rejected candidate never touches the slot.

use crate::config::IntakeConfig;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const UNSUPPORTED_TYPE_WARNING: &str = "Only JPG, WEBP, and PNG images are supported.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Png,
    Jpeg,
    Webp,
}

impl MediaType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        // Browsers may append parameters, e.g. `image/png; charset=binary`.
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn as_mime(&self) -> &'static str {
        match self {
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Webp => "image/webp",
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            MediaType::Png => image::ImageFormat::Png,
            MediaType::Jpeg => image::ImageFormat::Jpeg,
            MediaType::Webp => image::ImageFormat::WebP,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// A file as handed over by either input path, before validation.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub name: String,
    pub media_type: String,
    pub data: Bytes,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    name: String,
    media_type: MediaType,
    data: Bytes,
}

impl StagedFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn display_size(&self) -> String {
        format!("{:.2} MB", self.size() as f64 / 1024.0 / 1024.0)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IntakeError {
    #[error("{}", UNSUPPORTED_TYPE_WARNING)]
    UnsupportedMediaType(String),
    #[error("File size exceeds {}MB limit.", .limit / (1024 * 1024))]
    TooLarge { size: u64, limit: u64 },
}

/// Which input path delivered a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPath {
    Browse,
    Drop,
}

#[derive(Debug, Default)]
pub struct FileIntake {
    config: IntakeConfig,
    staged: Option<StagedFile>,
    dragging: bool,
    input_revision: u64,
}

impl FileIntake {
    pub fn new(config: IntakeConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn staged(&self) -> Option<&StagedFile> {
        self.staged.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Bumped on every clear so a bound input control can be reset.
    pub fn input_revision(&self) -> u64 {
        self.input_revision
    }

    /// Rejection for an upload of `size` bytes over the configured ceiling.
    pub fn oversize_error(&self, size: u64) -> IntakeError {
        IntakeError::TooLarge {
            size,
            limit: self.config.max_file_size_bytes,
        }
    }

    /// Stages `candidate`, replacing whatever was staged before.
    pub fn select_file(&mut self, candidate: CandidateFile) -> Result<&StagedFile, IntakeError> {
        let media_type = MediaType::from_mime(&candidate.media_type)
            .ok_or_else(|| IntakeError::UnsupportedMediaType(candidate.media_type.clone()))?;

        let size = candidate.data.len() as u64;
        if self.config.enforce_size_limit && size > self.config.max_file_size_bytes {
            return Err(self.oversize_error(size));
        }

        tracing::debug!(name = %candidate.name, %media_type, size, "staging file");

        let staged: &StagedFile = self.staged.insert(StagedFile {
            name: candidate.name,
            media_type,
            data: candidate.data,
        });
        Ok(staged)
    }

    /// Runs a selection event from either input path. An event that carries
    /// no file is ignored.
    pub fn receive(
        &mut self,
        path: InputPath,
        candidate: Option<CandidateFile>,
    ) -> Result<Option<&StagedFile>, IntakeError> {
        if path == InputPath::Drop {
            self.dragging = false;
        }
        match candidate {
            Some(candidate) => self.select_file(candidate).map(Some),
            None => Ok(None),
        }
    }

    pub fn clear(&mut self) {
        self.staged = None;
        self.input_revision += 1;
    }

    pub fn drag_enter(&mut self) {
        self.dragging = true;
    }

    pub fn drag_over(&mut self) {
        self.dragging = true;
    }

    pub fn drag_leave(&mut self) {
        self.dragging = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, media_type: &str, len: usize) -> CandidateFile {
        CandidateFile::new(name, media_type, Bytes::from(vec![7u8; len]))
    }

    #[test]
    fn test_rejects_unsupported_media_types_without_touching_slot() {
        let mut intake = FileIntake::new(IntakeConfig::default());
        intake.select_file(candidate("site.png", "image/png", 16)).unwrap();

        for media_type in ["image/gif", "application/pdf", "text/plain", "", "image/svg+xml"] {
            let err = intake
                .select_file(candidate("other", media_type, 8))
                .unwrap_err();
            assert_eq!(err, IntakeError::UnsupportedMediaType(media_type.into()));
            assert_eq!(err.to_string(), UNSUPPORTED_TYPE_WARNING);
            assert_eq!(intake.staged().unwrap().name(), "site.png");
        }
    }

    #[test]
    fn test_accepts_each_supported_type_and_replaces_previous() {
        let mut intake = FileIntake::new(IntakeConfig::default());

        for (i, mime) in ["image/png", "image/jpeg", "image/webp", "IMAGE/PNG; x=y"]
            .iter()
            .enumerate()
        {
            let name = format!("file-{}", i);
            let staged = intake.select_file(candidate(&name, mime, i + 1)).unwrap();
            assert_eq!(staged.name(), name);
            assert_eq!(staged.size(), (i + 1) as u64);
        }

        assert_eq!(intake.staged().unwrap().media_type(), MediaType::Png);
        assert_eq!(intake.staged().unwrap().name(), "file-3");
    }

    #[test]
    fn test_clear_then_reselect_same_file() {
        let mut intake = FileIntake::new(IntakeConfig::default());
        let file = candidate("crew.jpg", "image/jpeg", 32);

        let first = intake.select_file(file.clone()).unwrap().clone();
        intake.clear();
        assert!(intake.staged().is_none());
        assert_eq!(intake.input_revision(), 1);

        let second = intake.select_file(file).unwrap().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_size_limit_enforced_when_configured() {
        let mut intake = FileIntake::new(IntakeConfig {
            max_file_size_bytes: 10,
            enforce_size_limit: true,
        });
        let err = intake
            .select_file(candidate("big.png", "image/png", 11))
            .unwrap_err();
        assert_eq!(err, IntakeError::TooLarge { size: 11, limit: 10 });
        assert!(intake.staged().is_none());

        let mut lenient = FileIntake::new(IntakeConfig {
            max_file_size_bytes: 10,
            enforce_size_limit: false,
        });
        assert!(lenient.select_file(candidate("big.png", "image/png", 11)).is_ok());
    }

    #[test]
    fn test_oversize_error_reports_configured_limit() {
        let intake = FileIntake::new(IntakeConfig::default());
        let err = intake.oversize_error(20 * 1024 * 1024);
        assert_eq!(
            err,
            IntakeError::TooLarge {
                size: 20 * 1024 * 1024,
                limit: 10 * 1024 * 1024
            }
        );
        assert_eq!(err.to_string(), "File size exceeds 10MB limit.");
    }

    #[test]
    fn test_too_large_message() {
        let err = IntakeError::TooLarge {
            size: 11 * 1024 * 1024,
            limit: 10 * 1024 * 1024,
        };
        assert_eq!(err.to_string(), "File size exceeds 10MB limit.");
    }

    #[test]
    fn test_drag_flag_transitions() {
        let mut intake = FileIntake::new(IntakeConfig::default());
        assert!(!intake.is_dragging());

        intake.drag_enter();
        intake.drag_over();
        assert!(intake.is_dragging());
        intake.drag_leave();
        assert!(!intake.is_dragging());

        intake.drag_over();
        let staged = intake
            .receive(InputPath::Drop, Some(candidate("drop.webp", "image/webp", 4)))
            .unwrap();
        assert_eq!(staged.unwrap().media_type(), MediaType::Webp);
        assert!(!intake.is_dragging());
    }

    #[test]
    fn test_drop_of_invalid_file_still_clears_drag_flag() {
        let mut intake = FileIntake::new(IntakeConfig::default());
        intake.drag_enter();
        assert!(intake
            .receive(InputPath::Drop, Some(candidate("notes.txt", "text/plain", 4)))
            .is_err());
        assert!(!intake.is_dragging());
    }

    #[test]
    fn test_empty_selection_is_noop() {
        let mut intake = FileIntake::new(IntakeConfig::default());
        intake.select_file(candidate("a.png", "image/png", 4)).unwrap();
        assert!(intake.receive(InputPath::Browse, None).unwrap().is_none());
        assert_eq!(intake.staged().unwrap().name(), "a.png");
    }

    #[test]
    fn test_display_size() {
        let mut intake = FileIntake::new(IntakeConfig::default());
        let staged = intake
            .select_file(candidate("a.png", "image/png", 1536 * 1024))
            .unwrap();
        assert_eq!(staged.display_size(), "1.50 MB");
    }
}
