use thiserror::Error;

/// Top-level error type shared by the intake crates.
///
/// Subsystem crates define their own error enums and implement
/// `From<SubsystemError> for IntakeError` where the `?` operator needs to
/// cross a crate boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IntakeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid field id: {0}")]
    InvalidFieldId(String),

    #[error("Record already submitted as {0}")]
    AlreadySubmitted(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for IntakeError {
    fn from(err: toml::de::Error) -> Self {
        IntakeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for IntakeError {
    fn from(err: toml::ser::Error) -> Self {
        IntakeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for IntakeError {
    fn from(err: serde_json::Error) -> Self {
        IntakeError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for intake operations.
pub type Result<T> = std::result::Result<T, IntakeError>;
