use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E3xxx: Engine errors (registration, discovery, likes, economy)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    BadRequest,
    ServiceUnavailable,
    Timeout,

    // Engine (E3xxx)
    ProfileNotFound,
    RegistrationIncomplete,
    InvalidTarget,
    QuotaExceeded,
    PreconditionFailed,
    PremiumRequired,
    InsufficientBalance,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::BadRequest => "E0008",
            Self::ServiceUnavailable => "E0007",
            Self::Timeout => "E0010",

            // Engine
            Self::ProfileNotFound => "E3001",
            Self::RegistrationIncomplete => "E3002",
            Self::InvalidTarget => "E3003",
            Self::QuotaExceeded => "E3004",
            Self::PreconditionFailed => "E3005",
            Self::PremiumRequired => "E3006",
            Self::InsufficientBalance => "E3007",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::ValidationError | Self::BadRequest | Self::InvalidTarget => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::ProfileNotFound => StatusCode::NOT_FOUND,
            Self::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::RegistrationIncomplete | Self::PreconditionFailed | Self::PremiumRequired => {
                StatusCode::PRECONDITION_FAILED
            }
            Self::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,
        }
    }
}

/// Failures reported by a document store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("transaction aborted after {0} conflicting attempts")]
    Conflict(u32),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal error")]
    Internal(#[from] anyhow::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

const GENERIC_FAILURE: &str = "Something went wrong on our side. Please try again in a moment.";
const NEEDS_REGISTRATION: &str = "You don't have a profile yet. Type /start to create one.";

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Never shown to end users; [`AppError::user_message`] masks it.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(anyhow::Error::msg(message.into()))
    }

    pub fn profile_not_found() -> Self {
        Self::new(ErrorCode::ProfileNotFound, NEEDS_REGISTRATION)
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QuotaExceeded, message)
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PreconditionFailed, message)
    }

    pub fn insufficient_balance(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientBalance, message)
    }

    /// The error code this error maps to on the wire.
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Known { code, .. } => *code,
            AppError::Internal(_) => ErrorCode::InternalError,
            AppError::Store(StoreError::NotFound) => ErrorCode::ProfileNotFound,
            AppError::Store(_) => ErrorCode::ServiceUnavailable,
        }
    }

    /// True when the record the operation needed no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self.code(), ErrorCode::ProfileNotFound | ErrorCode::NotFound)
    }

    /// Text safe to show to an end user. Internal details never leak.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Known { message, .. } => message.clone(),
            AppError::Store(StoreError::NotFound) => NEEDS_REGISTRATION.to_string(),
            AppError::Internal(_) | AppError::Store(_) => GENERIC_FAILURE.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Store(err) => {
                tracing::error!(error = %err, "store error");
                match err {
                    StoreError::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new(ErrorCode::ProfileNotFound.code(), NEEDS_REGISTRATION),
                    ),
                    _ => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ApiErrorResponse::new(ErrorCode::ServiceUnavailable.code(), "store unavailable"),
                    ),
                }
            }
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn known_error_envelope() {
        let (status, value) = body_json(AppError::quota_exceeded("daily swipes used up")).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "E3004");
        assert_eq!(value["error"]["message"], "daily swipes used up");
    }

    #[tokio::test]
    async fn store_backend_error_is_masked() {
        let (status, value) = body_json(AppError::Store(StoreError::Backend("conn reset".into()))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(value["error"]["message"], "store unavailable");
    }

    #[test]
    fn missing_record_means_registration() {
        let err = AppError::from(StoreError::NotFound);
        assert!(err.is_not_found());
        assert!(err.user_message().contains("/start"));
    }

    #[test]
    fn internal_errors_never_leak_details() {
        let err = AppError::from(anyhow::anyhow!("redis://secret-host refused"));
        assert!(!err.user_message().contains("secret-host"));
        assert_eq!(err.code(), ErrorCode::InternalError);
    }

    #[test]
    fn internal_constructor_is_masked_for_users() {
        let err = AppError::internal("profile transaction produced no outcome");
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(err.user_message(), GENERIC_FAILURE);
    }
}
