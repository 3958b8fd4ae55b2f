use thiserror::Error;

use crate::sources::ExtractionError;

#[derive(Error, Debug)]
pub enum GatewayError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Request errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Aggregation backend errors
    #[error("Upstream feed request failed: {0}")]
    UpstreamFeed(String),

    #[error("Malformed feed: {0}")]
    MalformedFeed(String),

    // Extraction backend errors
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("No artifact available for {0}")]
    NoArtifactAvailable(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::UpstreamFeed(err.to_string())
    }
}

impl From<ExtractionError> for GatewayError {
    fn from(err: ExtractionError) -> Self {
        GatewayError::Extraction(err.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
