use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{AccountProfile, AccountResponse};
use crate::services::AuthSession;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(
        min = 6,
        max = 128,
        message = "Password must be between 6 and 128 characters"
    ))]
    pub password: String,

    #[validate(length(max = 100))]
    pub first_name: Option<String>,

    #[validate(length(max = 100))]
    pub last_name: Option<String>,
}

impl RegisterRequest {
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            avatar_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyQuery {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResendVerificationRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    /// Required for accounts that already have a password.
    pub current_password: Option<String>,

    #[validate(length(
        min = 6,
        max = 128,
        message = "Password must be between 6 and 128 characters"
    ))]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: String,
    pub state: String,
}

/// Session body. The refresh token never appears here; it travels only in
/// its HTTP-only cookie.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub account: AccountResponse,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl From<AuthSession> for SessionResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            account: session.account,
            access_token: session.tokens.access_token,
            token_type: session.tokens.token_type,
            expires_in: session.tokens.expires_in,
        }
    }
}
