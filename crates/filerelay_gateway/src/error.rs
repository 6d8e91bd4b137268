use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use filerelay_contract::{ApiResponse, ValidationError};
use filerelay_transfer::{RelayError, StagingError};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Invalid or missing API key")]
    Unauthorized,
    #[error("Discord webhook URL is not configured correctly on the server")]
    ServerConfig,
    #[error(transparent)]
    Relay(RelayError),
    #[error("Error fetching uploads")]
    History(#[source] anyhow::Error),
    #[error("Server error")]
    Internal(#[source] anyhow::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Relay(error) if error.is_source_failure() => StatusCode::BAD_REQUEST,
            Self::ServerConfig | Self::Relay(_) | Self::History(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ValidationError> for GatewayError {
    fn from(error: ValidationError) -> Self {
        Self::InvalidInput(error.to_string())
    }
}

impl From<RelayError> for GatewayError {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::Interrupted(source) => Self::Internal(anyhow::Error::new(source)),
            other => Self::Relay(other),
        }
    }
}

impl From<StagingError> for GatewayError {
    fn from(error: StagingError) -> Self {
        match error {
            StagingError::TooLarge { .. } => Self::InvalidInput(error.to_string()),
            StagingError::Io(source) => Self::Internal(anyhow::Error::new(source)),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::History(source) | Self::Internal(source) => {
                error!(error = %source, "request failed")
            }
            _ if status.is_server_error() => error!(error = %self, "request failed"),
            _ => warn!(status = status.as_u16(), error = %self, "request rejected"),
        }

        (status, Json(ApiResponse::failure(self.to_string()))).into_response()
    }
}
