use crate::storage::StorageError;
use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, rejection::PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{msg}")]
    Validation { value: String, msg: String },
    #[error("{msg}")]
    BusinessRule { value: String, msg: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Request body is too large")]
    PayloadTooLarge,
    #[error("Something went wrong")]
    Unexpected(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(value: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            value: value.into(),
            msg: msg.into(),
        }
    }

    pub fn rule(value: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::BusinessRule {
            value: value.into(),
            msg: msg.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn unexpected(error: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected(error.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::BusinessRule { .. } | Self::NotFound(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let value = match self {
            Self::Validation { value, .. } | Self::BusinessRule { value, .. } => value.clone(),
            Self::NotFound(what) => what.clone(),
            Self::Unauthorized(_) | Self::Forbidden(_) => "authorization".into(),
            Self::PayloadTooLarge | Self::Unexpected(_) => String::new(),
        };

        ErrorBody {
            errors: vec![ErrorItem {
                value,
                msg: self.to_string(),
            }],
        }
    }
}

/// Uniform error envelope: `{"errors": [{"value": ..., "msg": ...}]}`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub errors: Vec<ErrorItem>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorItem {
    pub value: String,
    pub msg: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Unexpected(_) => tracing::error!("{:#?}", self),
            _ => tracing::info!(error.message = %self, "Request rejected"),
        }

        (self.status_code(), Json(self.body())).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        Self::Unexpected(error.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation("body", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation("path", rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge
        } else {
            Self::validation("body", error.body_text())
        }
    }
}
