//! Unified error handling with Sentry integration.
//!
//! Route handlers that can fail return `Result<T, AppError>`. Server-side
//! failures are captured to Sentry before the response is built. The session
//! core itself never produces an `AppError`: its failures settle into session
//! states instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::baas::BaasError;
use crate::services::exam_token::ExamTokenError;

/// Application-level error type for the portal.
#[derive(Debug, Error)]
pub enum AppError {
    /// Backend operation failed.
    #[error("Backend error: {0}")]
    Baas(#[from] BaasError),

    /// Exam token input was malformed.
    #[error("Exam token error: {0}")]
    ExamToken(#[from] ExamTokenError),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Internal(_)
                | Self::Baas(
                    BaasError::Http(_)
                        | BaasError::Parse(_)
                        | BaasError::Api { .. }
                        | BaasError::Storage(_)
                )
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Baas(err) => match err {
                BaasError::InvalidCredentials | BaasError::NoSession | BaasError::SessionExpired => {
                    StatusCode::UNAUTHORIZED
                }
                BaasError::UserAlreadyExists => StatusCode::CONFLICT,
                BaasError::WeakPassword(_) => StatusCode::BAD_REQUEST,
                BaasError::Http(_) | BaasError::Api { .. } => StatusCode::BAD_GATEWAY,
                BaasError::Parse(_) | BaasError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::ExamToken(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Message safe to show the user.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::Baas(err) => match err {
                BaasError::InvalidCredentials => "Invalid email or password".to_string(),
                BaasError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                BaasError::WeakPassword(msg) => msg.clone(),
                BaasError::NoSession | BaasError::SessionExpired => {
                    "Your session has expired, please sign in again".to_string()
                }
                BaasError::Http(_) | BaasError::Api { .. } => "External service error".to_string(),
                BaasError::Parse(_) | BaasError::Storage(_) => "Internal server error".to_string(),
            },
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (self.status(), self.public_message()).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called once a session resolves so errors are associated with the user.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("auth", "Signed in", Some(&[("role", "teacher")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(BaasError::InvalidCredentials.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(BaasError::UserAlreadyExists.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(
                BaasError::Api {
                    status: 503,
                    message: "down".to_string()
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_details_not_exposed() {
        let err = AppError::Baas(BaasError::Api {
            status: 500,
            message: "relation \"profiles\" does not exist".to_string(),
        });
        assert_eq!(err.public_message(), "External service error");
    }
}
