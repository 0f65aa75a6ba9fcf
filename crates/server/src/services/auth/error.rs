//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::tokens::TokenError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] iutcart_core::EmailError),

    /// Invalid credentials (wrong password, unknown or malformed email).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Reset token failed signature, kind or expiry checks.
    #[error("invalid token")]
    InvalidToken,

    /// No account for the email asking for a reset.
    #[error("unknown email")]
    UnknownEmail,

    /// No user holds the presented reset token.
    #[error("user not found")]
    UserNotFound,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// A required field is missing or empty.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Token signing failed.
    #[error("token error: {0}")]
    Token(TokenError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
