//! Error types shared across Stepcast crates.

use std::path::PathBuf;

/// Upper bound for transcoder diagnostics carried inside an error.
pub const MAX_DIAGNOSTIC_BYTES: usize = 8 * 1024;

/// Top-level error type for Stepcast operations.
#[derive(Debug, thiserror::Error)]
pub enum StepcastError {
    #[error("Configuration conflict: {message}")]
    ConfigurationConflict { message: String },

    #[error("Invalid step #{index}: {message}")]
    InvalidStep { index: usize, message: String },

    #[error("External tool unavailable: {tool}")]
    ExternalToolUnavailable { tool: String },

    #[error("Transcode stage '{stage}' timed out after {timeout_secs}s: {diagnostics}")]
    TranscodeTimeout {
        stage: String,
        timeout_secs: u64,
        diagnostics: String,
    },

    #[error("Transcode stage '{stage}' failed ({status}): {diagnostics}")]
    TranscodeFailure {
        stage: String,
        status: String,
        diagnostics: String,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using StepcastError.
pub type StepcastResult<T> = Result<T, StepcastError>;

/// Coarse classification of a [`StepcastError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigurationConflict,
    InvalidStep,
    ExternalToolUnavailable,
    TranscodeTimeout,
    TranscodeFailure,
    FileNotFound,
    Io,
    Other,
}

impl StepcastError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConfigurationConflict {
            message: msg.into(),
        }
    }

    pub fn invalid_step(index: usize, msg: impl Into<String>) -> Self {
        Self::InvalidStep {
            index,
            message: msg.into(),
        }
    }

    pub fn tool_unavailable(tool: impl Into<String>) -> Self {
        Self::ExternalToolUnavailable { tool: tool.into() }
    }

    pub fn timeout(stage: impl Into<String>, timeout_secs: u64, diagnostics: &str) -> Self {
        Self::TranscodeTimeout {
            stage: stage.into(),
            timeout_secs,
            diagnostics: bound_diagnostics(diagnostics),
        }
    }

    pub fn transcode(stage: impl Into<String>, status: impl Into<String>, diagnostics: &str) -> Self {
        Self::TranscodeFailure {
            stage: stage.into(),
            status: status.into(),
            diagnostics: bound_diagnostics(diagnostics),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigurationConflict { .. } => ErrorKind::ConfigurationConflict,
            Self::InvalidStep { .. } => ErrorKind::InvalidStep,
            Self::ExternalToolUnavailable { .. } => ErrorKind::ExternalToolUnavailable,
            Self::TranscodeTimeout { .. } => ErrorKind::TranscodeTimeout,
            Self::TranscodeFailure { .. } => ErrorKind::TranscodeFailure,
            Self::FileNotFound { .. } => ErrorKind::FileNotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) | Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether the caller may fall back to the unmodified capture when
    /// the output format is not mandatory.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ExternalToolUnavailable
                | ErrorKind::TranscodeTimeout
                | ErrorKind::TranscodeFailure
        )
    }
}

/// Keep the tail of a diagnostic stream within [`MAX_DIAGNOSTIC_BYTES`].
///
/// The transcoder reports the fatal cause last, so the head is what gets cut.
pub fn bound_diagnostics(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() <= MAX_DIAGNOSTIC_BYTES {
        return trimmed.to_string();
    }

    let mut cut = trimmed.len() - MAX_DIAGNOSTIC_BYTES;
    while !trimmed.is_char_boundary(cut) {
        cut += 1;
    }
    format!("[{cut} bytes truncated] ...{}", &trimmed[cut..])
}
