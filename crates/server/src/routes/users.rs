//! User authentication routes.

use axum::{Json, extract::State};
use serde::Deserialize;

use crate::error::{ApiJson, Result};
use crate::models::AuthenticatedProfile;
use crate::state::AppState;

use super::MessageResponse;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Missing fields default to empty so the service reports which is required.
#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgetPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

/// `POST /api/users/signin`
pub async fn signin(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignInRequest>,
) -> Result<Json<AuthenticatedProfile>> {
    let profile = state.auth().sign_in(&req.email, &req.password).await?;
    Ok(Json(profile))
}

/// `POST /api/users/signup`
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignUpRequest>,
) -> Result<Json<AuthenticatedProfile>> {
    let profile = state
        .auth()
        .sign_up(&req.name, &req.email, &req.password)
        .await?;
    Ok(Json(profile))
}

/// `POST /api/users/forget-password`
pub async fn forget_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ForgetPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    state.auth().forget_password(&req.email).await?;
    Ok(Json(MessageResponse {
        message: "We sent a reset password link to your mail.",
    }))
}

/// `POST /api/users/reset-password`
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    state
        .auth()
        .reset_password(&req.token, &req.password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password reset successfully",
    }))
}
