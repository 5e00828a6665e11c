use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::{
        auth::{LoginRequest, SessionResponse},
        MessageResponse,
    },
    services::{AuthSession, CSRF_COOKIE},
    utils::ValidatedJson,
    AppState,
};

pub const REFRESH_COOKIE: &str = "refresh_token";
/// The refresh cookie is only ever sent to the session endpoints.
const REFRESH_COOKIE_PATH: &str = "/auth";

/// Set the refresh-token cookie and a freshly rotated CSRF cookie.
pub(crate) fn with_session_cookies(
    state: &AppState,
    jar: CookieJar,
    refresh_token: String,
) -> Result<CookieJar, AppError> {
    let secure = state.config.security.secure_cookies;
    let max_age = time::Duration::seconds(state.tokens.refresh_token_expiry_seconds());
    let csrf_token = state.csrf.issue()?;

    Ok(jar
        .add(
            Cookie::build((REFRESH_COOKIE, refresh_token))
                .path(REFRESH_COOKIE_PATH)
                .http_only(true)
                .secure(secure)
                .same_site(SameSite::Strict)
                .max_age(max_age)
                .build(),
        )
        .add(
            // readable by scripts so it can be echoed in the header
            Cookie::build((CSRF_COOKIE, csrf_token))
                .path("/")
                .http_only(false)
                .secure(secure)
                .same_site(SameSite::Strict)
                .max_age(max_age)
                .build(),
        ))
}

fn without_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(REFRESH_COOKIE).path(REFRESH_COOKIE_PATH))
        .remove(Cookie::build(CSRF_COOKIE).path("/"))
}

/// Split a session into its cookies and JSON body.
pub(crate) fn session_response(
    state: &AppState,
    jar: CookieJar,
    session: AuthSession,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let jar = with_session_cookies(state, jar, session.tokens.refresh_token.clone())?;
    Ok((jar, Json(SessionResponse::from(session))))
}

/// Login with email and password
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.auth_service.login(&req.email, &req.password).await?;
    session_response(&state, jar, session)
}

/// Rotate the session using the refresh-token cookie
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let refresh_token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_owned())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing refresh token")))?;

    let session = state.auth_service.refresh(&refresh_token).await?;
    session_response(&state, jar, session)
}

/// Logout always succeeds and always clears the session cookies
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(refresh_token) = jar.get(REFRESH_COOKIE).map(|c| c.value().to_owned()) {
        state.auth_service.logout(&refresh_token).await;
    }

    (
        StatusCode::OK,
        without_session_cookies(jar),
        Json(MessageResponse::new("Logged out successfully")),
    )
}
