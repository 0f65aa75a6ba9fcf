//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use iutcart_core::{Email, Roles, UserId};

/// A registered user (domain type).
///
/// Holds the password hash and any pending reset token, so it is never
/// serialized directly. Use [`PublicProfile`] at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Login address, unique across users.
    pub email: Email,
    /// Argon2id PHC string.
    pub password_hash: String,
    /// Seller and admin flags.
    pub roles: Roles,
    /// The single outstanding password reset token, if any.
    pub reset_token: Option<String>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    pub password_hash: String,
    pub roles: Roles,
}

/// The user fields safe to send to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicProfile {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub name: String,
    pub email: Email,
    #[serde(flatten)]
    pub roles: Roles,
}

impl From<&User> for PublicProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            roles: user.roles,
        }
    }
}

/// Sign-in and sign-up response: the profile plus a session token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedProfile {
    #[serde(flatten)]
    pub profile: PublicProfile,
    pub token: String,
}
