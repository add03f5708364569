use crate::services::{assembler::AssemblyError, blob_store::StoreError};
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Failure classes of the gateway's boundary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    StorageUnavailable,
    NotFound,
    CorruptMetadata,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::StorageUnavailable => "StorageUnavailable",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::CorruptMetadata => "CorruptMetadata",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::CorruptMetadata => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("corrupt metadata for `{reference}`: {reason}")]
    CorruptMetadata { reference: String, reason: String },
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            GatewayError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::CorruptMetadata { .. } => ErrorKind::CorruptMetadata,
        }
    }
}

impl From<AssemblyError> for GatewayError {
    fn from(err: AssemblyError) -> Self {
        GatewayError::InvalidArgument(err.to_string())
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => GatewayError::NotFound(format!("blob `{id}`")),
            StoreError::Corrupt(id) => GatewayError::CorruptMetadata {
                reference: id.to_string(),
                reason: "stored bytes do not match their identifier".into(),
            },
            other => GatewayError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        GatewayError::StorageUnavailable(format!("entity registry: {err}"))
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

impl AppError {
    /// Shortcut for a 400 InvalidArgument
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        GatewayError::InvalidArgument(msg.into()).into()
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
            "kind": self.kind.map(ErrorKind::as_str),
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let kind = err.kind();
        Self {
            status: kind.status(),
            kind: Some(kind),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        GatewayError::from(err).into()
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        Self {
            status,
            kind: status
                .is_client_error()
                .then_some(ErrorKind::InvalidArgument),
            message: err.body_text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::ContentId;

    #[test]
    fn store_errors_map_onto_taxonomy() {
        let id = ContentId::of(b"bytes A");
        assert_eq!(
            GatewayError::from(StoreError::NotFound(id.clone())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            GatewayError::from(StoreError::Corrupt(id.clone())).kind(),
            ErrorKind::CorruptMetadata
        );
        let exhausted = StoreError::Unavailable {
            op: "put",
            id,
            attempts: 4,
            reason: "503".into(),
        };
        assert_eq!(
            GatewayError::from(exhausted).kind(),
            ErrorKind::StorageUnavailable
        );
    }

    #[test]
    fn kinds_carry_http_status() {
        let err = AppError::from(GatewayError::CorruptMetadata {
            reference: "x".into(),
            reason: "bad".into(),
        });
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind, Some(ErrorKind::CorruptMetadata));
        assert_eq!(
            AppError::invalid_argument("no name").status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorKind::StorageUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
