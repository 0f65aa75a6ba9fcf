//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`. Every error body has the shape
//! `{"message": "..."}`.

use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::auth::AuthError;
use crate::services::orders::OrderError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Order operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Request body could not be read as the expected JSON.
    #[error("Invalid request body: {0}")]
    Json(#[from] JsonRejection),

    /// Caller is not authenticated or lacks the required role.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::InvalidToken => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::UnknownEmail | AuthError::UserNotFound => StatusCode::NOT_FOUND,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::InvalidEmail(_) | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
                AuthError::Repository(_) | AuthError::Token(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Order(err) => match err {
                OrderError::Validation(_) => StatusCode::BAD_REQUEST,
                OrderError::NotFound => StatusCode::NOT_FOUND,
                OrderError::Notification(_) | OrderError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// The client-facing message. Internal details are never exposed.
    fn message(&self) -> String {
        match self {
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::InvalidToken => "Invalid Token".to_string(),
                AuthError::UnknownEmail => "User not found.".to_string(),
                AuthError::UserNotFound => "User not found".to_string(),
                AuthError::UserAlreadyExists => "User already exists".to_string(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::Validation(msg) => msg.clone(),
                AuthError::Repository(_) | AuthError::Token(_) | AuthError::PasswordHash => {
                    "Internal server error".to_string()
                }
            },
            Self::Order(err) => match err {
                OrderError::Validation(msg) => msg.clone(),
                OrderError::NotFound => "Order Not Found".to_string(),
                OrderError::Notification(_) => "Error sending email".to_string(),
                OrderError::Repository(_) => "Internal server error".to_string(),
            },
            Self::Json(rejection) => rejection.body_text(),
            Self::Unauthorized(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorBody {
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// `axum::Json` whose rejections answer with the `{message}` error body.
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl<T: Serialize> IntoResponse for ApiJson<T> {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::db::RepositoryError;
    use crate::services::notifications::NotifyError;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::Unauthorized("No Token".to_string());
        assert_eq!(err.to_string(), "Unauthorized: No Token");

        let err = AppError::Order(OrderError::NotFound);
        assert!(err.to_string().starts_with("Order error:"));
    }

    #[tokio::test]
    async fn test_auth_errors_map_to_messages() {
        let cases = [
            (
                AppError::Auth(AuthError::InvalidCredentials),
                StatusCode::UNAUTHORIZED,
                "Invalid email or password",
            ),
            (
                AppError::Auth(AuthError::InvalidToken),
                StatusCode::UNAUTHORIZED,
                "Invalid Token",
            ),
            (
                AppError::Auth(AuthError::UnknownEmail),
                StatusCode::NOT_FOUND,
                "User not found.",
            ),
            (
                AppError::Auth(AuthError::UserNotFound),
                StatusCode::NOT_FOUND,
                "User not found",
            ),
            (
                AppError::Auth(AuthError::UserAlreadyExists),
                StatusCode::CONFLICT,
                "User already exists",
            ),
        ];

        for (err, status, message) in cases {
            let (got_status, body) = render(err).await;
            assert_eq!(got_status, status);
            assert_eq!(body, serde_json::json!({ "message": message }));
        }
    }

    #[tokio::test]
    async fn test_order_errors() {
        let (status, body) = render(AppError::Order(OrderError::NotFound)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Order Not Found");

        let (status, body) = render(AppError::Order(OrderError::Notification(
            NotifyError::QueueFull,
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Error sending email");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (status, body) = render(AppError::Order(OrderError::Repository(
            RepositoryError::DataCorruption("bad email in row 7".to_string()),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");

        let (status, body) = render(AppError::Auth(AuthError::Repository(
            RepositoryError::Conflict("users".to_string()),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }
}
