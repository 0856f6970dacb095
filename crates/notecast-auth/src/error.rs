use thiserror::Error;

/// Why a bearer token was refused, or why the check itself could not run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("You aren't logged in, please login first")]
    Unauthenticated,

    #[error("Invalid or expired token, please login again")]
    InvalidToken,

    #[error("This user no longer exists")]
    UserGone,

    #[error("You must confirm your email first")]
    EmailNotConfirmed,

    #[error("Your password has changed, please login again")]
    StaleToken,

    #[error("Your session has expired, please login again")]
    SessionRevoked,

    #[error("You don't have permission to perform this action")]
    Forbidden,

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// HTTP status code the rejection maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::EmailNotConfirmed | Self::Forbidden => 403,
            Self::Internal(_) => 500,
            _ => 401,
        }
    }

    /// True for a rejection of the caller, false for an internal failure.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}
