//! Request-level errors and their HTTP mapping.

use crate::ocr::AnalysisError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

pub const NO_IMAGE_MESSAGE: &str = "No image provided";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Body is not a JSON object carrying `image` (400).
    #[error("No image provided")]
    MissingImage,

    /// `image` is present but cannot be turned into bytes (400).
    #[error("{0}")]
    InvalidImage(String),

    /// The vision service failed or rejected the call (502 / 504).
    #[error(transparent)]
    Upstream(#[from] AnalysisError),
}

/// JSON error body. Only `error` is always present.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream_code: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingImage | Self::InvalidImage(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(AnalysisError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::MissingImage => ErrorBody {
                error: NO_IMAGE_MESSAGE.to_string(),
                upstream_status: None,
                upstream_code: None,
            },
            Self::Upstream(AnalysisError::Rejected { status, code, .. }) => ErrorBody {
                error: self.to_string(),
                upstream_status: Some(*status),
                upstream_code: code.clone(),
            },
            _ => ErrorBody {
                error: self.to_string(),
                upstream_status: None,
                upstream_code: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }
        (status, Json(self.body())).into_response()
    }
}
