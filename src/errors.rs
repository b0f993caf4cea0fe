use crate::models::access::AccessError;
use crate::services::{auth_db::AuthError, gateway_errors::GatewayError, kv::KvError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<KvError> for AppError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::AlreadyExists => AppError::new(StatusCode::CONFLICT, err.to_string()),
            KvError::Invalid(reason) => AppError::new(StatusCode::FORBIDDEN, reason),
            other => {
                tracing::error!("credential store failure: {}", other);
                AppError::internal("internal error")
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotFound(_) => AppError::not_found(err.to_string()),
            AuthError::Invalid(reason) => AppError::new(StatusCode::FORBIDDEN, reason),
            AuthError::AlreadyExists => AppError::new(StatusCode::CONFLICT, err.to_string()),
            AuthError::Access(access) => access.into(),
            AuthError::Kv(kv) => kv.into(),
            AuthError::Crypto(_) => {
                tracing::error!("credential crypto failure: {}", err);
                AppError::internal("internal error")
            }
        }
    }
}

/// S3-facing errors keep their own status; the message is the client-safe
/// one, so storage internals never leak.
impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        if err.status().is_server_error() {
            tracing::error!("gateway failure: {}", err);
        }
        AppError::new(
            err.status(),
            format!("{}: {}", err.code(), err.client_message()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkError;

    #[test]
    fn auth_errors_map_to_statuses() {
        let err: AppError = AuthError::Invalid("revoked by admin".into()).into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.message, "revoked by admin");

        let err: AppError = AuthError::AlreadyExists.into();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err: AppError = AuthError::Crypto("decrypt").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal error");
    }

    #[test]
    fn gateway_errors_keep_s3_status_without_leaking() {
        let err: AppError = GatewayError::UnsupportedDelimiter {
            delimiter: "-".into(),
        }
        .into();
        assert_eq!(err.status, StatusCode::NOT_IMPLEMENTED);
        assert!(err.message.starts_with("NotImplemented"));

        let err: AppError =
            GatewayError::Storage(NetworkError::Other("disk 7 on node-3 failed".into())).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("node-3"));
    }
}
