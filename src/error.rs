use thiserror::Error;

/// Failures surfaced to callers of the recorder, renderer and translator.
#[derive(Error, Debug)]
pub enum SignError {
    #[error("{0}")]
    Validation(String),

    #[error("a recording for '{word}' already exists; pass overwrite to replace it")]
    Conflict { word: String },

    #[error("no recording found for '{word}'")]
    NotFound { word: String },

    #[error("capture device unavailable: {0}")]
    Device(String),

    #[error("landmark asset problem: {0}")]
    Integrity(String),

    #[error("capture for '{word}' was cancelled")]
    Cancelled { word: String },

    #[error("storage failure: {0}")]
    Storage(#[from] std::io::Error),
}

impl SignError {
    /// Stable name of the error kind, shown alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            SignError::Validation(_) => "ValidationError",
            SignError::Conflict { .. } => "ConflictError",
            SignError::NotFound { .. } => "NotFoundError",
            SignError::Device(_) => "DeviceError",
            SignError::Integrity(_) => "IntegrityError",
            SignError::Cancelled { .. } => "CancelledError",
            SignError::Storage(_) => "StorageError",
        }
    }

    /// Wraps a pipeline failure, keeping its context chain in the message.
    pub fn device(err: anyhow::Error) -> Self {
        SignError::Device(format!("{err:#}"))
    }

    pub(crate) fn integrity(err: impl std::fmt::Display) -> Self {
        SignError::Integrity(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SignError>;
