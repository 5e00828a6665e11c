use service_core::error::AppError;
use thiserror::Error;

/// Coarse classification of a [`ServiceError`], for callers that branch on
/// the kind rather than the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InvalidCredentials,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    TokenRevoked,
    TokenExpired,
    InvalidToken,
    InvalidCsrf,
    AlreadyVerified,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid CSRF token")]
    InvalidCsrf,

    #[error("Email already verified")]
    AlreadyVerified,

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServiceError::InvalidCredentials => ErrorKind::InvalidCredentials,
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::TokenRevoked => ErrorKind::TokenRevoked,
            ServiceError::TokenExpired => ErrorKind::TokenExpired,
            ServiceError::InvalidToken => ErrorKind::InvalidToken,
            ServiceError::InvalidCsrf => ErrorKind::InvalidCsrf,
            ServiceError::AlreadyVerified => ErrorKind::AlreadyVerified,
            ServiceError::Database(_) | ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ServiceError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ServiceError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ServiceError::Conflict(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ServiceError::InvalidInput(msg.into())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(anyhow::Error::new(err))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::Unauthorized(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            // Both render the same message so callers cannot tell session states apart.
            ServiceError::TokenRevoked | ServiceError::InvalidToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid token"))
            }
            ServiceError::TokenExpired => AppError::BadRequest(anyhow::anyhow!("Token expired")),
            ServiceError::InvalidCsrf => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid CSRF token"))
            }
            ServiceError::AlreadyVerified => {
                AppError::BadRequest(anyhow::anyhow!("Email already verified"))
            }
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
