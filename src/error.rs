use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors raised by the storage/locking core. Mirrors the kinds in spec §7.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("'{0}' is busy")]
    BusyPath(String),
    #[error("'DANGER: {0}'")]
    DangerousPath(String),
    #[error("'{0}' not found")]
    NotFound(String),
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    #[error("'{0}' is not a file")]
    NotAFile(String),
    #[error("'{0}' is not a dir")]
    NotADir(String),
    #[error("'{0}' and '{1}' are the same")]
    SameSrcDest(String, String),
}

/// Errors about the shape of the request itself, as opposed to the target path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing query parameter '{0}'")]
    MissingQueryParameter(String),
    #[error("invalid query parameter '{0}'")]
    InvalidQueryParameter(String),
    #[error("missing json key '{0}'")]
    MissingJsonKey(String),
    #[error("invalid json key '{0}'")]
    InvalidJsonKey(String),
    #[error("missing multipart value '{0}'")]
    MissingMultipart(String),
    #[error("invalid multipart value '{0}'")]
    InvalidMultipart(String),
}

/// The single error type threaded through Storage and the HTTP layer.
///
/// Every variant renders as a 400 with `{"error": "<message>"}` - clients are
/// expected to be able to see and act on every error kind, including internal
/// ones, per spec §6/§7.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("{kind}: '{message}'")]
    Internal { kind: &'static str, message: String },
}

impl AppError {
    /// Builds an Internal error, tagged with the underlying cause's type name.
    /// We can't recover that via reflection from an arbitrary error type, so
    /// callers supply it at the conversion site (see storage.rs/zipstream.rs).
    pub fn internal(kind: &'static str, err: impl std::fmt::Display) -> Self {
        AppError::Internal {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal("io::Error", err)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::internal("tokio::task::JoinError", err)
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        AppError::internal("zip::result::ZipError", err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal { .. } => tracing::error!(error = %self, "internal error"),
            _ => tracing::warn!(error = %self, "request rejected"),
        }

        let body = Json(json!({ "error": self.to_string() }));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}
