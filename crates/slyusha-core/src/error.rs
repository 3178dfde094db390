use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlyushaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Generation provider error: {0}")]
    Provider(String),

    #[error("Channel error ({channel}): {reason}")]
    Channel { channel: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SlyushaError {
    /// Short error code used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            SlyushaError::Config(_) => "CONFIG_ERROR",
            SlyushaError::Database(_) => "DATABASE_ERROR",
            SlyushaError::Provider(_) => "PROVIDER_ERROR",
            SlyushaError::Channel { .. } => "CHANNEL_ERROR",
            SlyushaError::Serialization(_) => "SERIALIZATION_ERROR",
            SlyushaError::Io(_) => "IO_ERROR",
            SlyushaError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SlyushaError>;
