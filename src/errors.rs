//! # Error Taxonomy
//!
//! Every failure the share service can surface is an [`AppError`]. Handlers
//! convert errors into JSON responses with [`AppError::to_response`], so the
//! status code mapping lives in exactly one place.
//!
//! Gating failures on the public read path (`NotFound`, `Forbidden`,
//! `Expired`, `LimitReached`, password failures) carry fixed messages. They
//! never echo share contents, counters or which later check would also have
//! failed.

use http::StatusCode;
use thiserror::Error;
use worker::{Error as WorkerError, Response};

use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("{message}")]
    Validation { message: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Share is not public")]
    Forbidden,

    #[error("Share has expired and is no longer available")]
    Expired,

    #[error("Share has reached its download limit and is no longer available")]
    LimitReached,

    #[error("Password required")]
    PasswordRequired,

    #[error("Invalid password")]
    PasswordIncorrect,

    #[error("{message}")]
    Conflict { message: String },

    #[error("Quota exceeded")]
    QuotaExceeded,

    #[error("Could not allocate a share link, try again")]
    SlugExhausted,

    #[error("Upstream failure: {service}: {message}")]
    Upstream { service: &'static str, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::PasswordRequired | Self::PasswordIncorrect => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden | Self::QuotaExceeded => StatusCode::FORBIDDEN,
            Self::Expired => StatusCode::GONE,
            Self::LimitReached => StatusCode::TOO_MANY_REQUESTS,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::SlugExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Worker(_) | Self::Storage(_) | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the caller. Server-side details stay in logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Worker(_) | Self::Storage(_) | Self::Internal { .. } => {
                "Internal server error".to_string()
            }
            Self::Upstream { service, .. } => format!("{} is unavailable", service),
            other => other.to_string(),
        }
    }

    pub fn to_response(&self) -> worker::Result<Response> {
        Response::from_json(&serde_json::json!({ "error": self.public_message() }))
            .map(|response| response.with_status(self.status_code().as_u16()))
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => AppError::NotFound,
            StoreError::UniqueViolation(what) => AppError::Conflict {
                message: format!("{} already taken", what),
            },
            StoreError::Backend(message) => AppError::Storage(message),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::validation(format!("Invalid JSON: {}", error))
    }
}
