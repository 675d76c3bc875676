use crate::classifier::ClassifyError;
use crate::config::ConfigError;
use crate::embedding::EmbeddingError;
use crate::export::ExportError;
use crate::frame::FrameError;
use crate::store::StoreError;

use super::state::SessionState;

/// Everything a session operation or loop can fail with.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Camera unavailable or revoked. Fatal to the active loop.
    #[error("Camera device error: {0}")]
    Device(String),
    /// One frame could not be captured. Retried or skipped by the loops.
    #[error("Frame capture error: {0}")]
    Capture(String),
    #[error("No camera is open")]
    NoActiveCamera,
    #[error("Label cannot be empty")]
    InvalidLabel,
    #[error("Label '{0}' already exists")]
    DuplicateLabel(String),
    #[error("Unknown label '{0}'")]
    UnknownLabel(String),
    #[error("Label '{label}' reached its capacity of {cap} examples")]
    CapacityExceeded { label: String, cap: usize },
    #[error("Vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("At least 2 labels need examples, {trained} do")]
    InsufficientTraining { trained: usize },
    #[error("Classifier is not trained")]
    NotTrained,
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Cannot go from {from} to {to}")]
    InvalidTransition { from: SessionState, to: &'static str },
    #[error("Prediction aborted after {0} consecutive failures")]
    TooManyFailures(u32),
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Per-cycle failures the loops retry instead of giving up on.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::Capture(_) | SessionError::Embedding(_))
    }
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Device(msg) => SessionError::Device(msg),
            FrameError::Capture(msg) => SessionError::Capture(msg),
            FrameError::Closed => SessionError::NoActiveCamera,
        }
    }
}

impl From<EmbeddingError> for SessionError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::Unavailable(msg) => SessionError::ProviderUnavailable(msg),
            other => SessionError::Embedding(other.to_string()),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidLabel => SessionError::InvalidLabel,
            StoreError::DuplicateLabel(label) => SessionError::DuplicateLabel(label),
            StoreError::UnknownLabel(label) => SessionError::UnknownLabel(label),
            StoreError::CapacityExceeded { label, cap } => SessionError::CapacityExceeded { label, cap },
            StoreError::DimensionMismatch { expected, actual } => {
                SessionError::DimensionMismatch { expected, actual }
            }
        }
    }
}

impl From<ClassifyError> for SessionError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::NotTrained { .. } => SessionError::NotTrained,
            ClassifyError::DimensionMismatch { expected, actual } => {
                SessionError::DimensionMismatch { expected, actual }
            }
        }
    }
}
