use axum::http::StatusCode;
use tracing::error;

use crate::auth::repo::RepoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    InvalidCredentials,
    InvalidOrExpiredToken,
    NotFound,
    Internal,
}

/// Failure of a credential operation. No variant is returned after a partial write.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    /// Same message for unknown email, password-less account and wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Same message for unknown and expired tokens.
    #[error("Invalid or expired password reset token")]
    InvalidOrExpiredToken,
    #[error("{0}")]
    NotFound(String),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl CredentialError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::InvalidOrExpiredToken => ErrorKind::InvalidOrExpiredToken,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepoError> for CredentialError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::DuplicateEmail => {
                Self::Conflict("User with this email already exists.".into())
            }
            RepoError::Other(e) => Self::Internal(e),
        }
    }
}

/// Handler rejection shape. Internal details are logged, never returned.
impl From<CredentialError> for (StatusCode, String) {
    fn from(e: CredentialError) -> Self {
        let status = e.status();
        match e {
            CredentialError::Internal(inner) => {
                error!(error = %format!("{inner:#}"), "credential operation failed");
                (status, "Internal server error".into())
            }
            other => (status, other.to_string()),
        }
    }
}
