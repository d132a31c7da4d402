use thiserror::Error;

use crate::downloader::EngineError;

/// Everything a submission can end in besides success. None of these are fatal
/// to the application; each one is shown to the user and the relay goes back
/// to idle.
#[derive(Debug, Error)]
pub enum AppError {
    /// Form was incomplete, nothing was started
    #[error("{0}")]
    Validation(String),

    #[error("A download is already in progress")]
    Busy,

    /// Metadata lookup failed before any folder was created
    #[error("Could not read playlist information: {0}")]
    ProbeFailed(String),

    /// The download or a post-processing step failed
    #[error("{0}")]
    Engine(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Exited { code, message } => {
                log::debug!("engine exited with code {:?}", code);
                AppError::Engine(message)
            }
            other => AppError::Unexpected(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Unexpected(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ProbeFailed(err.to_string())
    }
}
