//! Error types for NeuroLens

use thiserror::Error;

/// Errors raised by the signal core and the orchestration around it
#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error("Device permission denied or unavailable: {0}")]
    DevicePermission(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Inference provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssessmentError {
    /// Whether restarting the task can recover from this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AssessmentError::DevicePermission(_)
                | AssessmentError::StreamInterrupted(_)
                | AssessmentError::Provider(_)
        )
    }
}

/// Failures of the external inference provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider timed out after {0} seconds")]
    Timeout(u64),

    #[error("Provider rejected credentials: {0}")]
    Auth(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Provider returned an empty response")]
    EmptyResponse,
}
