use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{services::IdentityClaims, AppState};

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware to require a valid access token
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
    })?;

    let identity = state.tokens.verify_access_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Access token rejected");
        AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
    })?;

    // Store identity in request extensions so handlers can access it
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Extractor for the authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser(pub IdentityClaims);

impl AuthUser {
    pub fn account_id(&self) -> Uuid {
        self.0.account_id
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts.extensions.get::<IdentityClaims>().ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
        })?;

        Ok(AuthUser(identity.clone()))
    }
}
