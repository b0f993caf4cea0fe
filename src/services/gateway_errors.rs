//! Translation of storage network failures into S3 errors.

use crate::network::NetworkError;
use crate::services::auth_db::AuthError;
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid upload id `{upload_id}` for `{bucket}/{object}`")]
    InvalidUploadId {
        bucket: String,
        object: String,
        upload_id: String,
    },
    #[error("bucket name is invalid")]
    BucketNameInvalid,
    #[error("delimiter `{delimiter}` is not supported")]
    UnsupportedDelimiter { delimiter: String },
    #[error("bucket `{bucket}` not found")]
    BucketNotFound { bucket: String },
    #[error("object `{object}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, object: String },
    #[error("part number {part_number} is out of range")]
    InvalidPartNumber { part_number: u32 },
    #[error("access key is not usable: {reason}")]
    InvalidAccessKey { reason: String },
    #[error("access denied")]
    AccessDenied,
    #[error("credential lookup failed: {0}")]
    Auth(#[source] AuthError),
    #[error("storage error: {0}")]
    Storage(#[source] NetworkError),
    /// The operation failed and releasing the project failed as well. The
    /// primary error decides what the client sees.
    #[error("{primary} (closing project also failed: {close})")]
    Cleanup {
        primary: Box<GatewayError>,
        close: NetworkError,
    },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// The error the operation itself produced, ignoring cleanup failures.
    pub fn primary(&self) -> &GatewayError {
        match self {
            GatewayError::Cleanup { primary, .. } => primary.primary(),
            other => other,
        }
    }

    /// S3 error code sent to clients.
    pub fn code(&self) -> &'static str {
        match self.primary() {
            GatewayError::InvalidUploadId { .. } => "NoSuchUpload",
            GatewayError::BucketNameInvalid => "InvalidBucketName",
            GatewayError::UnsupportedDelimiter { .. } => "NotImplemented",
            GatewayError::BucketNotFound { .. } => "NoSuchBucket",
            GatewayError::ObjectNotFound { .. } => "NoSuchKey",
            GatewayError::InvalidPartNumber { .. } => "InvalidArgument",
            GatewayError::InvalidAccessKey { .. } => "InvalidAccessKeyId",
            GatewayError::AccessDenied => "AccessDenied",
            GatewayError::Auth(_) | GatewayError::Storage(_) | GatewayError::Cleanup { .. } => {
                "InternalError"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.primary() {
            GatewayError::InvalidUploadId { .. }
            | GatewayError::BucketNotFound { .. }
            | GatewayError::ObjectNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::BucketNameInvalid | GatewayError::InvalidPartNumber { .. } => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::UnsupportedDelimiter { .. } => StatusCode::NOT_IMPLEMENTED,
            GatewayError::InvalidAccessKey { .. } | GatewayError::AccessDenied => {
                StatusCode::FORBIDDEN
            }
            GatewayError::Auth(_) | GatewayError::Storage(_) | GatewayError::Cleanup { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-safe message. Storage failures are reported generically so
    /// internal detail never reaches the client.
    pub fn client_message(&self) -> String {
        match self.primary() {
            GatewayError::Auth(_) | GatewayError::Storage(_) | GatewayError::Cleanup { .. } => {
                "We encountered an internal error, please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotFound(_) => GatewayError::InvalidAccessKey {
                reason: "unknown access key".to_string(),
            },
            AuthError::Invalid(reason) => GatewayError::InvalidAccessKey { reason },
            other => GatewayError::Auth(other),
        }
    }
}

/// Map a network failure for an operation on `bucket`/`object`.
pub fn convert_error(err: NetworkError, bucket: &str, object: &str) -> GatewayError {
    match err {
        NetworkError::BucketNotFound(_) => GatewayError::BucketNotFound {
            bucket: bucket.to_string(),
        },
        NetworkError::ObjectNotFound(_) => GatewayError::ObjectNotFound {
            bucket: bucket.to_string(),
            object: object.to_string(),
        },
        NetworkError::PermissionDenied(_) => GatewayError::AccessDenied,
        other => GatewayError::Storage(other),
    }
}

/// Like [`convert_error`], but an unknown stream id becomes
/// [`GatewayError::InvalidUploadId`].
pub fn convert_multipart_error(
    err: NetworkError,
    bucket: &str,
    object: &str,
    upload_id: &str,
) -> GatewayError {
    match err {
        NetworkError::StreamIdInvalid => GatewayError::InvalidUploadId {
            bucket: bucket.to_string(),
            object: object.to_string(),
            upload_id: upload_id.to_string(),
        },
        other => convert_error(other, bucket, object),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_stream_becomes_no_such_upload() {
        let err = convert_multipart_error(NetworkError::StreamIdInvalid, "b", "o", "u");
        match &err {
            GatewayError::InvalidUploadId {
                bucket,
                object,
                upload_id,
            } => {
                assert_eq!(bucket, "b");
                assert_eq!(object, "o");
                assert_eq!(upload_id, "u");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.code(), "NoSuchUpload");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn known_conditions_map_to_s3_codes() {
        let bucket = convert_error(NetworkError::BucketNotFound("x".into()), "b", "o");
        assert_eq!(bucket.code(), "NoSuchBucket");
        let object = convert_error(NetworkError::ObjectNotFound("x".into()), "b", "o");
        assert_eq!(object.code(), "NoSuchKey");
        let denied = convert_error(NetworkError::PermissionDenied("x".into()), "b", "o");
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn unmapped_errors_stay_generic() {
        let err = convert_multipart_error(
            NetworkError::Other("node 12 at 10.0.0.4 refused".into()),
            "b",
            "o",
            "u",
        );
        assert!(matches!(err, GatewayError::Storage(_)));
        assert_eq!(err.code(), "InternalError");
        assert!(!err.client_message().contains("10.0.0.4"));
    }

    #[test]
    fn credential_failures_map_to_access_key_errors() {
        let err = GatewayError::from(AuthError::Invalid("revoked".into()));
        assert_eq!(err.code(), "InvalidAccessKeyId");
        assert!(err.client_message().contains("revoked"));
        let err = GatewayError::from(AuthError::Crypto("decrypt"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn cleanup_failure_reports_primary() {
        let err = GatewayError::Cleanup {
            primary: Box::new(GatewayError::BucketNameInvalid),
            close: NetworkError::Closed,
        };
        assert!(matches!(err.primary(), GatewayError::BucketNameInvalid));
        assert_eq!(err.code(), "InvalidBucketName");
        assert!(err.to_string().contains("closing project also failed"));
    }
}
