use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::GatewayError;

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::NoArtifactAvailable(_) => StatusCode::NOT_FOUND,
            GatewayError::UpstreamFeed(_)
            | GatewayError::MalformedFeed(_)
            | GatewayError::Extraction(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error, details) = match &self {
            GatewayError::InvalidInput(msg) => (msg.clone(), None),
            GatewayError::NoArtifactAvailable(_) => (self.to_string(), None),
            GatewayError::UpstreamFeed(e) => {
                tracing::error!("Upstream feed error: {}", e);
                ("Upstream feed request failed".to_string(), Some(e.clone()))
            }
            GatewayError::MalformedFeed(e) => {
                tracing::error!("Malformed upstream feed: {}", e);
                ("Upstream returned a malformed feed".to_string(), Some(e.clone()))
            }
            GatewayError::Extraction(e) => {
                tracing::error!("Extraction error: {}", e);
                ("Extraction backend failed".to_string(), Some(e.clone()))
            }
            other => {
                tracing::error!("Internal error: {}", other);
                ("Internal error".to_string(), Some(other.to_string()))
            }
        };

        (status, Json(ErrorResponse { error, details })).into_response()
    }
}
