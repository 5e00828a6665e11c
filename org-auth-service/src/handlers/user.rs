use axum_extra::extract::cookie::{Cookie, CookieJar};
use service_core::{
    axum::{extract::State, response::IntoResponse, Json},
    error::AppError,
};

use super::auth::REFRESH_COOKIE;
use crate::{
    dtos::{auth::ChangePasswordRequest, MessageResponse},
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let account = state.auth_service.get_account(user.account_id()).await?;
    Ok(Json(account))
}

/// Change the password. The current session ends, so the refresh cookie is
/// dropped and the client must log in again.
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = state.auth_service.get_account(user.account_id()).await?;
    if account.has_password && req.current_password.is_none() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Current password is required"
        )));
    }

    state
        .auth_service
        .update_password(
            user.account_id(),
            req.current_password.as_deref(),
            &req.new_password,
        )
        .await?;

    let jar = jar.remove(Cookie::build(REFRESH_COOKIE).path("/auth"));
    Ok((jar, Json(MessageResponse::new("Password updated"))))
}
