use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Postgres SQLSTATE codes the store cares about.
mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const NOT_NULL_VIOLATION: &str = "23502";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const ADMIN_SHUTDOWN: &str = "57P01";
    pub const CONNECTION_EXCEPTION_CLASS: &str = "08";
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(anyhow::Error),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Bad Gateway: {0}")]
    BadGateway(String),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseUnavailable(_) | AppError::ServiceUnavailable
        )
    }

    /// Translate a sqlx error, keeping `context` in the message.
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound(anyhow::anyhow!("{}", context)),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::DatabaseUnavailable(anyhow::anyhow!("{}: {}", context, err))
            }
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
                let message = format!("{}: {}", context, db_err.message());
                match code.as_str() {
                    sqlstate::UNIQUE_VIOLATION => AppError::Conflict(anyhow::anyhow!(message)),
                    sqlstate::FOREIGN_KEY_VIOLATION => {
                        AppError::ForeignKeyViolation(anyhow::anyhow!(message))
                    }
                    sqlstate::NOT_NULL_VIOLATION | sqlstate::CHECK_VIOLATION => {
                        AppError::BadRequest(anyhow::anyhow!(message))
                    }
                    sqlstate::SERIALIZATION_FAILURE
                    | sqlstate::DEADLOCK_DETECTED
                    | sqlstate::ADMIN_SHUTDOWN => {
                        AppError::DatabaseUnavailable(anyhow::anyhow!(message))
                    }
                    c if c.starts_with(sqlstate::CONNECTION_EXCEPTION_CLASS) => {
                        AppError::DatabaseUnavailable(anyhow::anyhow!(message))
                    }
                    _ => AppError::DatabaseError(anyhow::anyhow!(message)),
                }
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, err)),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::from_sqlx("Database operation failed", err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<serde_json::Value>,
        }

        let (status, error_message, details, retry_after) = match self {
            AppError::ValidationError(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                serde_json::to_value(&err).ok(),
                None,
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None, None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None, None),
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None, None),
            AppError::Forbidden(err) => (StatusCode::FORBIDDEN, err.to_string(), None, None),
            AppError::Conflict(err) => (StatusCode::CONFLICT, err.to_string(), None, None),
            AppError::ForeignKeyViolation(err) => (
                StatusCode::CONFLICT,
                "Referenced resource is missing or still in use".to_string(),
                Some(serde_json::Value::String(err.to_string())),
                None,
            ),
            AppError::TooManyRequests(msg, retry) => {
                (StatusCode::TOO_MANY_REQUESTS, msg, None, retry)
            }
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                    None,
                )
            }
            AppError::BadGateway(msg) => (
                StatusCode::BAD_GATEWAY,
                format!("Bad Gateway: {}", msg),
                None,
                None,
            ),
            AppError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable".to_string(),
                None,
                None,
            ),
            AppError::DatabaseUnavailable(err) => {
                tracing::warn!(error = %err, "Database unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Database unavailable".to_string(),
                    None,
                    Some(1),
                )
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                    None,
                )
            }
            AppError::EmailError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Email error".to_string(),
                Some(serde_json::Value::String(msg)),
                None,
            ),
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(serde_json::Value::String(err.to_string())),
                None,
            ),
        };

        let mut res = (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::{ValidationError, ValidationErrors};

    #[test]
    fn transient_classification() {
        assert!(AppError::DatabaseUnavailable(anyhow::anyhow!("down")).is_transient());
        assert!(AppError::ServiceUnavailable.is_transient());
        assert!(!AppError::DatabaseError(anyhow::anyhow!("syntax")).is_transient());
        assert!(!AppError::Conflict(anyhow::anyhow!("dup")).is_transient());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = AppError::from_sqlx("Charge not found", sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn pool_timeout_is_transient() {
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
    }

    #[test]
    fn status_codes() {
        let cases = vec![
            (AppError::BadRequest(anyhow::anyhow!("x")), StatusCode::BAD_REQUEST),
            (AppError::NotFound(anyhow::anyhow!("x")), StatusCode::NOT_FOUND),
            (AppError::Conflict(anyhow::anyhow!("x")), StatusCode::CONFLICT),
            (
                AppError::ForeignKeyViolation(anyhow::anyhow!("x")),
                StatusCode::CONFLICT,
            ),
            (
                AppError::TooManyRequests("slow down".to_string(), Some(3)),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                AppError::DatabaseUnavailable(anyhow::anyhow!("x")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::DatabaseError(anyhow::anyhow!("x")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn validation_errors_are_unprocessable() {
        let mut errors = ValidationErrors::new();
        errors.add("period", ValidationError::new("period_format"));
        let response = AppError::from(errors).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let response = AppError::TooManyRequests("slow down".to_string(), Some(7)).into_response();
        assert_eq!(
            response.headers().get(axum::http::header::RETRY_AFTER).unwrap(),
            "7"
        );
    }
}
