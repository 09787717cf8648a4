//! Error types for the orchestrator pipeline.
//!
//! Errors carry context that chains through layers:
//! Run → Stage → Service → Detail

use std::io;

use thiserror::Error;

use crate::services::{
    AnalyzerError, DownloadError, RepositoryError, SceneError, UrlError,
};

/// Top-level pipeline error.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage failed during execution.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: StageError,
    },

    /// The pipeline could not be assembled (storage backend, client setup).
    #[error("Pipeline setup failed: {message}")]
    SetupFailed { message: String },

    /// Every stage succeeded but no result object was produced.
    #[error("Pipeline finished without a {what}")]
    MissingResult { what: String },
}

impl PipelineError {
    /// Create a stage failed error.
    pub fn stage_failed(stage: impl Into<String>, source: StageError) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            source,
        }
    }

    /// Create a setup failed error.
    pub fn setup_failed(message: impl Into<String>) -> Self {
        Self::SetupFailed {
            message: message.into(),
        }
    }

    /// Create a missing result error.
    pub fn missing_result(what: impl Into<String>) -> Self {
        Self::MissingResult { what: what.into() }
    }

    /// Name of the failed stage, if a stage failed.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// Error from a pipeline stage.
#[derive(Error, Debug)]
pub enum StageError {
    /// Input validation failed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The URL does not belong to a supported platform.
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    #[error("Download failed: {0}")]
    Download(DownloadError),

    #[error("Scene extraction failed: {0}")]
    SceneExtraction(SceneError),

    #[error("AI analysis failed: {0}")]
    Analysis(#[from] AnalyzerError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// An external command failed.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// A previous stage did not leave what this stage needs.
    #[error("Precondition not met: {0}")]
    PreconditionFailed(String),

    /// Generic stage error with message.
    #[error("{0}")]
    Other(String),
}

impl StageError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a command failed error.
    pub fn command_failed(
        tool: impl Into<String>,
        exit_code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a precondition failed error.
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<UrlError> for StageError {
    fn from(err: UrlError) -> Self {
        match err {
            UrlError::Unsupported(url) => Self::UnsupportedUrl(url),
            UrlError::Empty => Self::InvalidInput(err.to_string()),
        }
    }
}

impl From<DownloadError> for StageError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::CommandFailed {
                tool,
                exit_code,
                message,
            } => Self::command_failed(tool, exit_code, message),
            other => Self::Download(other),
        }
    }
}

impl From<SceneError> for StageError {
    fn from(err: SceneError) -> Self {
        match err {
            SceneError::CommandFailed {
                tool,
                exit_code,
                message,
            } => Self::command_failed(tool, exit_code, message),
            other => Self::SceneExtraction(other),
        }
    }
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_displays_context() {
        let err = StageError::command_failed("yt-dlp", 1, "Video unavailable");
        let msg = err.to_string();
        assert!(msg.contains("yt-dlp"));
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("Video unavailable"));
    }

    #[test]
    fn pipeline_error_chains_context() {
        let pipeline_err = PipelineError::stage_failed(
            "download",
            StageError::precondition_failed("video id not set"),
        );

        assert_eq!(pipeline_err.stage(), Some("download"));
        let msg = pipeline_err.to_string();
        assert!(msg.contains("download"));
        assert!(msg.contains("video id not set"));
    }

    #[test]
    fn url_errors_map_to_stage_errors() {
        let unsupported: StageError = UrlError::Unsupported("https://x".to_string()).into();
        assert!(matches!(unsupported, StageError::UnsupportedUrl(_)));

        let empty: StageError = UrlError::Empty.into();
        assert!(matches!(empty, StageError::InvalidInput(_)));
    }

    #[test]
    fn service_errors_convert() {
        let err: StageError = DownloadError::Network("timed out".to_string()).into();
        assert!(err.to_string().starts_with("Download failed"));

        let err: StageError = SceneError::MissingInput("v.mp4".into()).into();
        assert!(matches!(err, StageError::SceneExtraction(_)));
    }

    #[test]
    fn tool_failures_become_command_failed() {
        let err: StageError = DownloadError::CommandFailed {
            tool: "yt-dlp".to_string(),
            exit_code: 1,
            message: "ERROR: Video unavailable".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            StageError::CommandFailed { ref tool, exit_code: 1, .. } if tool == "yt-dlp"
        ));

        let err: StageError = SceneError::CommandFailed {
            tool: "ffmpeg".to_string(),
            exit_code: 187,
            message: "Invalid data found".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "ffmpeg failed with exit code 187: Invalid data found");
    }
}
