use intake_core::IntakeError;
use thiserror::Error;

/// Errors from the extraction and merge layer.
///
/// None of these ever reach the user: the merger logs them and keeps the
/// record it already had.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Extractor unavailable: {0}")]
    Unavailable(String),

    #[error("Extractor output unusable: {0}")]
    Unusable(String),

    #[error("Extraction timed out after {0}ms")]
    Timeout(u64),

    #[error("Schema error: {0}")]
    Schema(String),
}

impl From<serde_json::Error> for ExtractionError {
    fn from(err: serde_json::Error) -> Self {
        ExtractionError::Unusable(err.to_string())
    }
}

impl From<regex::Error> for ExtractionError {
    fn from(err: regex::Error) -> Self {
        ExtractionError::Schema(err.to_string())
    }
}

impl From<ExtractionError> for IntakeError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Schema(msg) => IntakeError::Config(msg),
            other => IntakeError::Serialization(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractionError>;
