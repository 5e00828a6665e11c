use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    services::{CSRF_COOKIE, CSRF_HEADER},
    AppState,
};

/// Double-submit check for state-changing requests. Safe methods pass through.
pub async fn csrf_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(req).await);
    }

    let cookie = jar.get(CSRF_COOKIE).map(|c| c.value());
    let header = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = state.csrf.verify(cookie, header) {
        tracing::warn!(
            method = %req.method(),
            uri = %req.uri(),
            cookie_present = cookie.is_some(),
            header_present = header.is_some(),
            "CSRF check failed"
        );
        return Err(e.into());
    }

    Ok(next.run(req).await)
}
