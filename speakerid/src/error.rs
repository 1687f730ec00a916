use thiserror::Error;

/// Errors returned by speakerid vector operations.
#[derive(Debug, Error)]
pub enum SpeakerIdError {
    #[error("non-finite vector component at index {index}")]
    NonFinite { index: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("zero total weight in weighted merge")]
    ZeroWeight,
}
