use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::types::{Channel, Platform};

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateServiceError {
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Invalid build target: {0}")]
    InvalidBuildTarget(String),

    #[error("Invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("No builds found for {channel}/{platform}")]
    BuildNotFound { channel: Channel, platform: Platform },

    #[error("Ceiling build {version} not found for {channel}/{platform}")]
    CeilingBuildNotFound {
        channel: Channel,
        platform: Platform,
        version: String,
    },

    #[error("Update host is not configured")]
    MissingHost,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to render update document: {0}")]
    Render(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UpdateServiceError {
    /// The request itself is malformed, as opposed to missing data or a
    /// deployment problem
    pub fn is_malformed_request(&self) -> bool {
        matches!(
            self,
            Self::InvalidVersion(_)
                | Self::InvalidBuildTarget(_)
                | Self::InvalidPlatform(_)
                | Self::InvalidChannel(_)
        )
    }

    pub fn is_data_unavailable(&self) -> bool {
        matches!(
            self,
            Self::BuildNotFound { .. } | Self::CeilingBuildNotFound { .. }
        )
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingHost | Self::Configuration(_))
    }
}

pub type UpdateServiceResult<T> = std::result::Result<T, UpdateServiceError>;

impl IntoResponse for UpdateServiceError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            UpdateServiceError::InvalidVersion(v) => {
                warn!("Invalid version provided: {}", v);
                (
                    StatusCode::BAD_REQUEST,
                    "invalid_version",
                    "Invalid version format",
                    Some(format!("Version '{}' is not a valid version", v)),
                )
            }
            UpdateServiceError::InvalidBuildTarget(t) => {
                warn!("Invalid build target: {}", t);
                (
                    StatusCode::BAD_REQUEST,
                    "invalid_build_target",
                    "Invalid build target",
                    Some(format!("Build target '{}' matches no known platform", t)),
                )
            }
            UpdateServiceError::InvalidPlatform(p) => {
                warn!("Invalid platform: {}", p);
                (
                    StatusCode::BAD_REQUEST,
                    "invalid_platform",
                    "Invalid platform",
                    Some(format!("Platform '{}' is not supported", p)),
                )
            }
            UpdateServiceError::InvalidChannel(c) => {
                warn!("Invalid channel: {}", c);
                (
                    StatusCode::BAD_REQUEST,
                    "invalid_channel",
                    "Invalid channel",
                    Some(format!(
                        "Channel '{}' is not supported. Use 'release', 'beta', or 'dev'",
                        c
                    )),
                )
            }
            UpdateServiceError::BuildNotFound { channel, platform } => {
                warn!("No builds found for {}/{}", channel, platform);
                (
                    StatusCode::NOT_FOUND,
                    "build_not_found",
                    "No build available",
                    None,
                )
            }
            UpdateServiceError::CeilingBuildNotFound {
                channel,
                platform,
                version,
            } => {
                error!(
                    "Ceiling build {} missing for {}/{}",
                    version, channel, platform
                );
                (
                    StatusCode::NOT_FOUND,
                    "build_not_found",
                    "No build available",
                    None,
                )
            }
            UpdateServiceError::MissingHost | UpdateServiceError::Configuration(_) => {
                error!("Update service misconfigured: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "configuration_error",
                    "Update service is misconfigured",
                    None,
                )
            }
            UpdateServiceError::Render(e) => {
                error!("Failed to render update document: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "render_failed",
                    "Failed to render update document",
                    None,
                )
            }
            UpdateServiceError::Internal(e) => {
                error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                    None,
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: error_code.to_owned(),
                message: message.to_owned(),
                details,
            }),
        )
            .into_response()
    }
}
