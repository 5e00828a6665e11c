use axum_extra::extract::cookie::CookieJar;
use service_core::{
    axum::{
        extract::{Query, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use validator::Validate;

use super::session::session_response;
use crate::{
    dtos::{
        auth::{RegisterRequest, ResendVerificationRequest, VerifyQuery},
        MessageResponse,
    },
    services::RegisterInput,
    utils::ValidatedJson,
    AppState,
};

/// Create an account and open its first session
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = req.profile();
    let session = state
        .auth_service
        .register(RegisterInput {
            email: req.email,
            password: req.password,
            profile,
        })
        .await?;

    let (jar, body) = session_response(&state, jar, session)?;
    Ok((StatusCode::CREATED, jar, body))
}

/// Confirm an email address from the emailed link
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<impl IntoResponse, AppError> {
    query.validate()?;
    let account = state.auth_service.verify_email(&query.token).await?;
    Ok(Json(account))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResendVerificationRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.resend_verification(&req.email).await?;
    Ok(Json(MessageResponse::new("Verification email sent")))
}
