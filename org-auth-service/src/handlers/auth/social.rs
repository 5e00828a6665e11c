use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use secrecy::ExposeSecret;
use serde::Deserialize;
use service_core::{
    axum::{
        extract::{Query, State},
        response::Redirect,
    },
    error::AppError,
};
use sha2::{Digest, Sha256};

use super::session::with_session_cookies;
use crate::{
    config::GoogleOAuthConfig, dtos::auth::GoogleCallbackQuery, models::AccountProfile, AppState,
};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const CODE_VERIFIER_COOKIE: &str = "code_verifier";
const OAUTH_COOKIE_PATH: &str = "/auth/google";

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    verified_email: bool,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

impl GoogleUserInfo {
    fn profile(&self) -> AccountProfile {
        AccountProfile {
            first_name: self.given_name.clone(),
            last_name: self.family_name.clone(),
            avatar_url: self.picture.clone(),
        }
    }
}

fn google_config(state: &AppState) -> Result<&GoogleOAuthConfig, AppError> {
    state
        .config
        .google
        .as_ref()
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Google sign-in is not configured")))
}

fn random_url_safe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn pkce_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Short-lived cookie that must survive the cross-site redirect back from Google.
fn oauth_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(OAUTH_COOKIE_PATH)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(5))
        .build()
}

/// Redirect to Google's consent screen (authorization code flow with PKCE)
pub async fn google_login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let google = google_config(&state)?;
    let oauth_state = random_url_safe(16);
    let code_verifier = random_url_safe(32);
    let code_challenge = pkce_challenge(&code_verifier);

    let url = reqwest::Url::parse_with_params(
        GOOGLE_AUTH_URL,
        &[
            ("client_id", google.client_id.as_str()),
            ("redirect_uri", google.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", oauth_state.as_str()),
            ("code_challenge", code_challenge.as_str()),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid Google auth URL: {}", e)))?;

    let secure = state.config.security.secure_cookies;
    let jar = jar
        .add(oauth_cookie(OAUTH_STATE_COOKIE, oauth_state, secure))
        .add(oauth_cookie(CODE_VERIFIER_COOKIE, code_verifier, secure));

    Ok((jar, Redirect::to(url.as_str())))
}

/// Finish the Google flow, link or create the account and open a session.
/// The browser lands on the frontend, which picks up an access token via
/// `/auth/refresh`.
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<GoogleCallbackQuery>,
) -> Result<(CookieJar, Redirect), AppError> {
    let google = google_config(&state)?;

    let stored_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value());
    if stored_state != Some(query.state.as_str()) {
        tracing::warn!("Google callback with mismatched OAuth state");
        return Err(AppError::BadRequest(anyhow::anyhow!("Invalid OAuth state")));
    }

    let code_verifier = jar
        .get(CODE_VERIFIER_COOKIE)
        .map(|c| c.value().to_owned())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing code verifier")))?;

    let user_info = fetch_google_user(google, &query.code, &code_verifier).await?;

    if !user_info.verified_email {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Google account email not verified"
        )));
    }

    let session = state
        .auth_service
        .find_or_create_external_account(
            &format!("google:{}", user_info.id),
            &user_info.email,
            user_info.profile(),
        )
        .await?;

    tracing::info!(account_id = %session.account.id, "Account signed in via Google");

    let jar = jar
        .remove(Cookie::build(OAUTH_STATE_COOKIE).path(OAUTH_COOKIE_PATH))
        .remove(Cookie::build(CODE_VERIFIER_COOKIE).path(OAUTH_COOKIE_PATH));
    let jar = with_session_cookies(&state, jar, session.tokens.refresh_token)?;

    Ok((jar, Redirect::to(&google.frontend_url)))
}

async fn fetch_google_user(
    google: &GoogleOAuthConfig,
    code: &str,
    code_verifier: &str,
) -> Result<GoogleUserInfo, AppError> {
    let client = reqwest::Client::new();

    let token_res = client
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("client_id", google.client_id.as_str()),
            ("client_secret", google.client_secret.expose_secret().as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", google.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to exchange Google code");
            AppError::AuthError(anyhow::anyhow!("Authentication failed"))
        })?;

    if !token_res.status().is_success() {
        let status = token_res.status();
        let body = token_res.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "Google token exchange error");
        return Err(AppError::AuthError(anyhow::anyhow!("Authentication failed")));
    }

    let token: GoogleTokenResponse = token_res.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse Google token response");
        AppError::InternalError(anyhow::anyhow!("Internal server error"))
    })?;

    let user_res = client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(token.access_token)
        .send()
        .await
        .and_then(|res| res.error_for_status())
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch Google user info");
            AppError::AuthError(anyhow::anyhow!("Authentication failed"))
        })?;

    user_res.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse Google user info");
        AppError::InternalError(anyhow::anyhow!("Internal server error"))
    })
}
