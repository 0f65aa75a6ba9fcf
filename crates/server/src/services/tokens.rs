//! Signed tokens for sessions and password resets.
//!
//! Both kinds are HS256 JWTs signed with the same secret. The `kind` claim
//! keeps them apart: a reset token is never accepted as a session and vice
//! versa.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use iutcart_core::{Roles, UserId};

use crate::config::TokenConfig;
use crate::models::User;

/// Lifetime of a password reset token.
pub const RESET_TOKEN_TTL: Duration = Duration::from_secs(3 * 60 * 60);

#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad signature, malformed, or the wrong kind.
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("token encoding failed: {0}")]
    Encoding(jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Session,
    Reset,
}

/// Identity carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProfile {
    pub name: String,
    pub email: String,
    #[serde(flatten)]
    pub roles: Roles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token, so two tokens issued in the same second differ.
    pub jti: String,
    /// Present on session tokens only.
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub profile: Option<SessionProfile>,
}

impl Claims {
    /// The user id in `sub`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Invalid` if `sub` is not a user id.
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Invalid)
    }
}

/// Issues and verifies tokens with one process-wide secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    session_ttl: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(config: &TokenConfig) -> Self {
        Self::from_secret(&config.secret, config.session_ttl)
    }

    #[must_use]
    pub fn from_secret(secret: &SecretString, session_ttl: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            session_ttl,
        }
    }

    /// Issue a session token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Encoding` if signing fails.
    pub fn issue_session(&self, user: &User) -> Result<String, TokenError> {
        let profile = SessionProfile {
            name: user.name.clone(),
            email: user.email.to_string(),
            roles: user.roles,
        };
        self.issue(user.id, TokenKind::Session, self.session_ttl, Some(profile))
    }

    /// Issue a password reset token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Encoding` if signing fails.
    pub fn issue_reset(&self, user: UserId) -> Result<String, TokenError> {
        self.issue(user, TokenKind::Reset, RESET_TOKEN_TTL, None)
    }

    /// Verify a session token.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Expired` past `exp`, otherwise
    /// `TokenError::Invalid` for any other defect.
    pub fn verify_session(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token, TokenKind::Session)?;
        if claims.profile.is_none() {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    /// Verify a password reset token.
    ///
    /// # Errors
    ///
    /// Same as [`Self::verify_session`].
    pub fn verify_reset(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Reset)
    }

    fn issue(
        &self,
        subject: UserId,
        kind: TokenKind,
        ttl: Duration,
        profile: Option<SessionProfile>,
    ) -> Result<String, TokenError> {
        let iat = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: subject.to_string(),
            kind,
            iat,
            exp: iat.saturating_add(ttl),
            jti: uuid::Uuid::new_v4().to_string(),
            profile,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Encoding)
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            },
        )?;

        if data.claims.kind != kind {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use iutcart_core::Email;

    fn service(secret: &str) -> TokenService {
        TokenService::from_secret(&SecretString::from(secret), Duration::from_secs(3600))
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: UserId::new(11),
            name: "A".to_string(),
            email: Email::parse("a@x.com").unwrap(),
            password_hash: String::new(),
            roles: Roles::new(false, true),
            reset_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sign arbitrary claims, for tokens the service would never issue.
    fn sign(secret: &str, claims: &Claims) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_session_round_trip_carries_profile() {
        let tokens = service("s3cr3t-for-tests");
        let token = tokens.issue_session(&user()).unwrap();
        let claims = tokens.verify_session(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), UserId::new(11));
        let profile = claims.profile.unwrap();
        assert_eq!(profile.email, "a@x.com");
        assert!(profile.roles.is_seller);
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let tokens = service("s3cr3t-for-tests");
        let reset = tokens.issue_reset(UserId::new(11)).unwrap();
        let session = tokens.issue_session(&user()).unwrap();

        assert!(matches!(
            tokens.verify_session(&reset),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(
            tokens.verify_reset(&session),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_expired_token_rejected_without_leeway() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "11".to_string(),
            kind: TokenKind::Reset,
            iat: now - 10,
            exp: now - 1,
            jti: "x".to_string(),
            profile: None,
        };
        let token = sign("s3cr3t-for-tests", &claims);

        assert!(matches!(
            service("s3cr3t-for-tests").verify_reset(&token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_wrong_secret_and_garbage_rejected() {
        let token = service("secret-one-for-tests").issue_reset(UserId::new(1)).unwrap();
        let other = service("secret-two-for-tests");
        assert!(matches!(other.verify_reset(&token), Err(TokenError::Invalid)));
        assert!(matches!(other.verify_reset("not.a.jwt"), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens = service("s3cr3t-for-tests");
        let a = tokens.issue_reset(UserId::new(1)).unwrap();
        let b = tokens.issue_reset(UserId::new(1)).unwrap();
        assert_ne!(a, b);
    }
}
