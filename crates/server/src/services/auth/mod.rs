//! Authentication service.
//!
//! Password sign-in and sign-up, plus the two-step password reset: a signed
//! reset token is mailed out, then exchanged once for a new password.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::{info, instrument, warn};

use iutcart_core::{Email, Roles};

use crate::db::{RepositoryError, UserStore};
use crate::models::{AuthenticatedProfile, NewUser, PublicProfile, User};
use crate::services::email::OutgoingEmail;
use crate::services::notifications::NotificationQueue;
use crate::services::tokens::TokenService;

/// Authentication service.
///
/// Borrowed per request from the application state.
pub struct AuthService<'a> {
    users: &'a dyn UserStore,
    tokens: &'a TokenService,
    notifier: &'a NotificationQueue,
    base_url: &'a str,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(
        users: &'a dyn UserStore,
        tokens: &'a TokenService,
        notifier: &'a NotificationQueue,
        base_url: &'a str,
    ) -> Self {
        Self {
            users,
            tokens,
            notifier,
            base_url,
        }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email is malformed or
    /// unknown, or the password is wrong. The three cases are
    /// indistinguishable to the caller.
    #[instrument(skip(self, password))]
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedProfile, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &user.password_hash)?;

        info!(user_id = %user.id, "User signed in");
        self.authenticated(&user)
    }

    /// Register a buyer account and sign it in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for an empty name or password,
    /// `AuthError::InvalidEmail` for a malformed email and
    /// `AuthError::UserAlreadyExists` if the email is taken.
    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedProfile, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("Name is required".to_string()));
        }
        let email = Email::parse(email)?;
        validate_password(password)?;

        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create(&NewUser {
                name: name.to_string(),
                email,
                password_hash,
                roles: Roles::BUYER,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        info!(user_id = %user.id, "User registered");
        self.authenticated(&user)
    }

    // =========================================================================
    // Password Reset
    // =========================================================================

    /// Store a fresh reset token on the user and queue the reset email.
    ///
    /// The email is best effort: failing to compose or queue it is logged and
    /// the call still succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownEmail` if no user has this (well-formed)
    /// email.
    #[instrument(skip(self))]
    pub async fn forget_password(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::UnknownEmail)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::UnknownEmail)?;

        let token = self.tokens.issue_reset(user.id).map_err(AuthError::Token)?;
        self.users.set_reset_token(user.id, &token).await?;

        let link = format!("{}/reset-password/{token}", self.base_url);
        let queued = match OutgoingEmail::reset_password(&user, &link) {
            Ok(message) => self.notifier.enqueue(message).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = queued {
            warn!(user_id = %user.id, error = %e, "Reset email not queued");
        }

        info!(user_id = %user.id, "Password reset requested");
        Ok(())
    }

    /// Exchange a reset token for a new password.
    ///
    /// The token must verify and be the one currently stored on a user; it
    /// is cleared in the same write that stores the new hash.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token is forged, expired or
    /// not a reset token, `AuthError::UserNotFound` if no user holds it and
    /// `AuthError::Validation` if the password is empty.
    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), AuthError> {
        self.tokens
            .verify_reset(token)
            .map_err(|_| AuthError::InvalidToken)?;

        let user = self
            .users
            .get_by_reset_token(token)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let Some(user) = self
            .users
            .consume_reset_token(token, &password_hash)
            .await?
        else {
            warn!(user_id = %user.id, "Reset token consumed concurrently");
            return Err(AuthError::UserNotFound);
        };

        info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    fn authenticated(&self, user: &User) -> Result<AuthenticatedProfile, AuthError> {
        let token = self.tokens.issue_session(user).map_err(AuthError::Token)?;
        Ok(AuthenticatedProfile {
            profile: PublicProfile::from(user),
            token,
        })
    }
}

/// Passwords only need to be present; there is no strength policy.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::Validation("Password is required".to_string()));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;
    use crate::config::NotificationConfig;
    use crate::db::memory::MemoryStore;
    use crate::services::testing::RecordingMailer;

    struct Harness {
        store: Arc<MemoryStore>,
        tokens: TokenService,
        queue: NotificationQueue,
        mailer: Arc<RecordingMailer>,
    }

    impl Harness {
        fn new() -> Self {
            let mailer = Arc::new(RecordingMailer::default());
            let (queue, _worker) =
                NotificationQueue::spawn(mailer.clone(), NotificationConfig::default());
            Self {
                store: MemoryStore::new(),
                tokens: TokenService::from_secret(
                    &SecretString::from("unit-test-signing-key-0123456789"),
                    Duration::from_secs(3600),
                ),
                queue,
                mailer,
            }
        }

        fn service(&self) -> AuthService<'_> {
            AuthService::new(
                self.store.as_ref(),
                &self.tokens,
                &self.queue,
                "http://localhost:3000",
            )
        }
    }

    #[test]
    fn test_hash_password_salts() {
        let a = hash_password("p1").unwrap();
        let b = hash_password("p1").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("p1", &a).is_ok());
        assert!(matches!(
            verify_password("wrong", &a),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let h = Harness::new();
        let signed_up = h.service().sign_up("A", "a@x.com", "p1").await.unwrap();
        let signed_in = h.service().sign_in("a@x.com", "p1").await.unwrap();

        assert_eq!(signed_in.profile.id, signed_up.profile.id);
        let claims = h.tokens.verify_session(&signed_in.token).unwrap();
        assert_eq!(claims.user_id().unwrap(), signed_up.profile.id);
        assert!(!signed_in.profile.roles.can_manage_orders());
    }

    #[tokio::test]
    async fn test_sign_in_failures_are_indistinguishable() {
        let h = Harness::new();
        h.service().sign_up("A", "a@x.com", "p1").await.unwrap();

        for (email, password) in [("a@x.com", "wrong"), ("b@x.com", "p1"), ("nope", "p1")] {
            assert!(matches!(
                h.service().sign_in(email, password).await,
                Err(AuthError::InvalidCredentials)
            ));
        }
    }

    #[tokio::test]
    async fn test_sign_up_validation() {
        let h = Harness::new();
        assert!(matches!(
            h.service().sign_up("  ", "a@x.com", "p1").await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            h.service().sign_up("A", "a@x.com", "").await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            h.service().sign_up("A", "not-an-email", "p1").await,
            Err(AuthError::InvalidEmail(_))
        ));

        h.service().sign_up("A", "a@x.com", "p1").await.unwrap();
        assert!(matches!(
            h.service().sign_up("B", "a@x.com", "p2").await,
            Err(AuthError::UserAlreadyExists)
        ));
        // The existing account is untouched.
        assert!(h.service().sign_in("a@x.com", "p1").await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_flow_is_single_use() {
        let h = Harness::new();
        h.service().sign_up("A", "a@x.com", "p1").await.unwrap();
        h.service().forget_password("a@x.com").await.unwrap();

        let sent = h.mailer.wait_for(1, Duration::from_secs(2)).await;
        assert_eq!(sent.len(), 1);
        let user = h
            .store
            .get_by_email(&Email::parse("a@x.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        let token = user.reset_token.unwrap();
        assert!(sent[0].text.contains(&format!(
            "http://localhost:3000/reset-password/{token}"
        )));

        h.service().reset_password(&token, "p2").await.unwrap();
        assert!(h.service().sign_in("a@x.com", "p2").await.is_ok());
        assert!(matches!(
            h.service().reset_password(&token, "p3").await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_reset_checks_token_before_password() {
        let h = Harness::new();
        h.service().sign_up("A", "a@x.com", "p1").await.unwrap();

        assert!(matches!(
            h.service().reset_password("garbage", "").await,
            Err(AuthError::InvalidToken)
        ));

        // Valid signature, but nobody holds it.
        let stray = h.tokens.issue_reset(iutcart_core::UserId::new(1)).unwrap();
        assert!(matches!(
            h.service().reset_password(&stray, "").await,
            Err(AuthError::UserNotFound)
        ));

        h.service().forget_password("a@x.com").await.unwrap();
        let token = h
            .store
            .get_by_email(&Email::parse("a@x.com").unwrap())
            .await
            .unwrap()
            .unwrap()
            .reset_token
            .unwrap();
        assert!(matches!(
            h.service().reset_password(&token, "").await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_forget_password_unknown_email() {
        let h = Harness::new();
        assert!(matches!(
            h.service().forget_password("ghost@x.com").await,
            Err(AuthError::UnknownEmail)
        ));
        assert!(matches!(
            h.service().forget_password("").await,
            Err(AuthError::UnknownEmail)
        ));
    }
}
