use std::time::Duration;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Every failure a request can end in. Converted to the JSON error envelope
/// in exactly one place, the `IntoResponse` impl below.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("too many requests, retry after {}s", retry_after.as_secs())]
    TooManyRequests { retry_after: Duration },
    #[error("request timed out")]
    RequestTimeout,
    #[error("{message}")]
    Custom { status: StatusCode, message: String },
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Error with an explicit status code. Anything that is not a valid
    /// 4xx/5xx code is reported as 500.
    pub fn custom(status: u16, message: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(status)
            .ok()
            .filter(|s| s.is_client_error() || s.is_server_error())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        AppError::Custom {
            status,
            message: message.into(),
        }
    }

    pub fn not_found_route(method: &str, path: &str) -> Self {
        AppError::NotFound(format!("{method} {path} is not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            AppError::Custom { status, .. } => *status,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Internal detail stays in the logs.
    pub fn message(&self) -> String {
        match self {
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::PayloadTooLarge { limit } => {
                format!("Request body is larger than the {limit} byte limit")
            }
            AppError::TooManyRequests { .. } => {
                "Too many requests, please try again later.".to_string()
            }
            AppError::RequestTimeout => "Request timed out".to_string(),
            AppError::Custom { message, .. } => message.clone(),
            AppError::Database(_) | AppError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Database(err) => tracing::error!(error = ?err, "Database error"),
            AppError::Internal(msg) => tracing::error!(error = %msg, "Internal server error"),
            _ if status.is_server_error() => tracing::error!(%status, error = %self, "Request failed"),
            _ => tracing::debug!(%status, error = %self, "Request rejected"),
        }

        let body = Json(json!({
            "status": "error",
            "message": self.message(),
        }));

        let mut response = (status, body).into_response();
        if let AppError::TooManyRequests { retry_after } = self {
            response.headers_mut().insert(
                RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
        }
        response
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::custom(rejection.status().as_u16(), rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::custom(rejection.status().as_u16(), rejection.body_text())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Internal(format!("Failed to generate token: {err}"))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Password hashing failed: {err}"))
    }
}

/// Failures before the listener exists. Logged and fatal, never sent over HTTP.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("MONGO_URI is not set")]
    MissingDatabaseUri,
    #[error("could not connect to MongoDB: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_of(error: AppError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn explicit_status_and_message_round_trip() {
        let (status, body) = body_of(AppError::custom(418, "short and stout")).await;
        assert_eq!(status, StatusCode::IM_A_TEAPOT);
        assert_eq!(body, json!({"status": "error", "message": "short and stout"}));
    }

    #[tokio::test]
    async fn unspecified_status_defaults_to_500() {
        let (status, body) = body_of(AppError::custom(200, "not an error code")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "not an error code");

        assert_eq!(AppError::custom(42, "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let (status, body) =
            body_of(AppError::Internal("connection reset at pool.rs:42".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], INTERNAL_MESSAGE);
    }

    #[test]
    fn not_found_route_message() {
        let err = AppError::not_found_route("DELETE", "/nowhere");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "DELETE /nowhere is not found");
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let response = AppError::TooManyRequests {
            retry_after: Duration::from_secs(30),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "30");
    }
}
