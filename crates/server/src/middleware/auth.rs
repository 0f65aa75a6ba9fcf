//! Bearer token extractors.
//!
//! Protected handlers take [`RequireAuth`] (any signed-in user) or
//! [`RequireSeller`] (sellers and admins) as an argument. Roles come from the
//! session token's claims.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use iutcart_core::{Roles, UserId};

use crate::error::{AppError, set_sentry_user};
use crate::state::AppState;

/// The authenticated caller, as described by their session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub roles: Roles,
}

/// Extractor that requires a valid session token.
///
/// # Example
///
/// ```rust,ignore
/// async fn my_orders(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Orders of {}", user.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = bearer_token(parts)?;

        let claims = state
            .tokens()
            .verify_session(token)
            .map_err(|_| invalid_token())?;
        let id = claims.user_id().map_err(|_| invalid_token())?;
        let profile = claims.profile.ok_or_else(invalid_token)?;

        set_sentry_user(&id, Some(&profile.email));

        Ok(Self(CurrentUser {
            id,
            name: profile.name,
            email: profile.email,
            roles: profile.roles,
        }))
    }
}

/// Extractor that requires a session token with the seller or admin flag.
#[derive(Debug, Clone)]
pub struct RequireSeller(pub CurrentUser);

impl FromRequestParts<AppState> for RequireSeller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;

        if !user.roles.can_manage_orders() {
            tracing::info!(user_id = %user.id, "Seller route refused");
            return Err(AppError::Unauthorized("Invalid Seller Token".to_string()));
        }
        Ok(Self(user))
    }
}

/// The token after `Bearer ` in the `Authorization` header.
fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("No Token".to_string()))?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(invalid_token)
}

fn invalid_token() -> AppError {
    AppError::Unauthorized("Invalid Token".to_string())
}
