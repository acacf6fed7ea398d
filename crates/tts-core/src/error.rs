//! Unified error types for the synthesis server.

/// Main error type for synthesis operations.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// Invalid input provided by the caller.
    #[error("{0}")]
    InvalidInput(String),

    /// The model has not finished loading.
    #[error("Model not loaded")]
    NotReady,

    /// Model construction failed.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// Requested compute device is unavailable.
    #[error("device error: {0}")]
    Device(String),

    /// Model inference error.
    #[error("inference error: {0}")]
    Inference(String),

    /// WAV encoding error.
    #[error("audio encode error: {0}")]
    AudioEncode(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results with TtsError.
pub type TtsResult<T> = Result<T, TtsError>;

impl TtsError {
    /// Create an invalid input error with message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a model load error with message.
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a device error with message.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Create an inference error with message.
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create an audio encode error with message.
    pub fn audio_encode(msg: impl Into<String>) -> Self {
        Self::AudioEncode(msg.into())
    }

    /// Create a config error with message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error with message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error was caused by the caller rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}
