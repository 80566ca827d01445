//! Error types for Promocast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PromocastError>;

#[derive(Error, Debug)]
pub enum PromocastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure reported by a platform's publish call.
///
/// Cloned into job state and report entries, so it carries only strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

impl PlatformError {
    /// Transient failures are retried with backoff; everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Network(_)
            | PlatformError::Timeout(_)
            | PlatformError::Server(_)
            | PlatformError::RateLimit(_) => true,
            PlatformError::Authentication(_)
            | PlatformError::Validation(_)
            | PlatformError::Posting(_) => false,
        }
    }
}

/// An adapter could not fit the content to a platform without caller intervention.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Constraint violation on {platform}: {reason}")]
pub struct ConstraintViolation {
    pub platform: String,
    pub reason: String,
}

impl ConstraintViolation {
    pub fn new(platform: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            reason: reason.into(),
        }
    }
}

/// Why a platform never reached dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),

    #[error("platform '{0}' is disabled")]
    Disabled(String),

    #[error("no publisher registered for platform '{0}'")]
    NoPublisher(String),

    #[error("cancelled before dispatch")]
    Cancelled,
}
