use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use openssh_sftp_client::error::{Error as SftpError, SftpErrorKind};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Every failure a drive operation can surface to a caller
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("missing required fields: {}", .missing.join(", "))]
    Validation { missing: Vec<String> },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("remote operation failed: {0}")]
    RemoteOperation(String),
    #[error("activity log unavailable: {0}")]
    Persistence(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("credentials must be sent over https")]
    InsecureTransport,
}

impl DriveError {
    /// Builds a validation error out of the names of the absent fields
    pub fn missing<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DriveError::Validation {
            missing: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            DriveError::Validation { .. } | DriveError::InvalidInput(_) => "validation",
            DriveError::Connection(_) => "connection",
            DriveError::NotFound(_) => "not_found",
            DriveError::RemoteOperation(_) => "remote_operation",
            DriveError::Persistence(_) => "persistence",
            DriveError::Timeout(_) => "timeout",
            DriveError::InsecureTransport => "insecure_transport",
        }
    }

    /// Maps an SFTP protocol error for `path`, keeping "no such file" distinct
    pub fn from_sftp(err: SftpError, path: &str) -> Self {
        match err {
            SftpError::SftpError(SftpErrorKind::NoSuchFile, _) => {
                DriveError::NotFound(path.to_string())
            }
            other => DriveError::RemoteOperation(format!("{path}: {other}")),
        }
    }
}

impl From<std::io::Error> for DriveError {
    fn from(err: std::io::Error) -> Self {
        error!("local io error: {err:?}");
        DriveError::RemoteOperation(format!("local io error: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing: Option<Vec<String>>,
}

impl ResponseError for DriveError {
    fn status_code(&self) -> StatusCode {
        match self {
            DriveError::Validation { .. } | DriveError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DriveError::Connection(_) => StatusCode::BAD_GATEWAY,
            DriveError::NotFound(_) => StatusCode::NOT_FOUND,
            DriveError::RemoteOperation(_) | DriveError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DriveError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DriveError::InsecureTransport => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let missing = match self {
            DriveError::Validation { missing } => Some(missing.clone()),
            _ => None,
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            missing,
        })
    }
}
