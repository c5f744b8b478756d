use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// How a failed delivery should be treated by the stage runtime.
///
/// Transient failures are surfaced to the bus as a nack so the message is
/// redelivered with backoff; permanent failures are quarantined by the stage
/// and then acknowledged so the bus does not burn its retry budget on work
/// that can never succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Object not found: {bucket}/{name}")]
    ObjectNotFound { bucket: String, name: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Document decode error: {0}")]
    Decode(String),

    #[error("Model transport error: {0}")]
    ModelTransport(String),

    #[error("Model response error: {0}")]
    ModelResponse(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Throttled: {0}")]
    Throttled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PipelineError::Config(msg.into())
    }

    pub fn schema<S: Into<String>>(msg: S) -> Self {
        PipelineError::Schema(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        PipelineError::Validation(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        PipelineError::Storage(msg.into())
    }

    pub fn bus<S: Into<String>>(msg: S) -> Self {
        PipelineError::Bus(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        PipelineError::Decode(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        PipelineError::Internal(msg.into())
    }

    /// Classify this error for the retry contract.
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Warehouse(_)
            | PipelineError::Io(_)
            | PipelineError::Storage(_)
            | PipelineError::Bus(_)
            | PipelineError::ModelTransport(_)
            | PipelineError::DeadlineExceeded(_)
            | PipelineError::Throttled(_)
            | PipelineError::Internal(_) => FailureKind::Transient,

            PipelineError::Serialization(_)
            | PipelineError::Config(_)
            | PipelineError::Schema(_)
            | PipelineError::Validation(_)
            | PipelineError::ObjectNotFound { .. }
            | PipelineError::UnsupportedContentType(_)
            | PipelineError::Decode(_)
            | PipelineError::ModelResponse(_) => FailureKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}
