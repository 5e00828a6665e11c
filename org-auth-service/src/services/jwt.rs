use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ServiceError;
use crate::config::JwtConfig;

const ACCESS_TOKEN_TYPE: &str = "access";
const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Identity carried by both token kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    pub account_id: Uuid,
    pub email: String,
}

/// Claims for access tokens (short-lived, identity only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (account ID)
    pub sub: String,
    pub email: String,
    pub typ: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// Claims for refresh tokens (long-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject (account ID)
    pub sub: String,
    pub email: String,
    /// Session id; valid only while it equals the account's stored marker.
    pub sid: String,
    pub typ: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// Decoded refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRefreshToken {
    pub identity: IdentityClaims,
    pub session_id: String,
}

/// Access/refresh pair returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Creates and verifies signed, time-boxed tokens.
///
/// Verification failures of any cause surface as `ServiceError::InvalidToken`.
pub trait TokenIssuer: Send + Sync {
    fn issue_access_token(&self, claims: &IdentityClaims) -> Result<String, ServiceError>;

    fn issue_refresh_token(
        &self,
        claims: &IdentityClaims,
        session_id: &str,
    ) -> Result<String, ServiceError>;

    fn verify_access_token(&self, token: &str) -> Result<IdentityClaims, ServiceError>;

    fn verify_refresh_token(&self, token: &str) -> Result<VerifiedRefreshToken, ServiceError>;

    /// Unguessable random identifier (session ids, verification tokens).
    fn new_random_id(&self) -> String;

    fn access_token_expiry_seconds(&self) -> i64;

    fn refresh_token_expiry_seconds(&self) -> i64;
}

/// HS256 JWT issuer with separate secrets per token kind.
#[derive(Clone)]
pub struct JwtService {
    access_encoding_key: EncodingKey,
    access_decoding_key: DecodingKey,
    refresh_encoding_key: EncodingKey,
    refresh_decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let access = config.access_secret.expose_secret().as_bytes();
        let refresh = config.refresh_secret.expose_secret().as_bytes();

        tracing::info!(issuer = %config.issuer, "JWT service initialized with HS256 secrets");

        Self {
            access_encoding_key: EncodingKey::from_secret(access),
            access_decoding_key: DecodingKey::from_secret(access),
            refresh_encoding_key: EncodingKey::from_secret(refresh),
            refresh_decoding_key: DecodingKey::from_secret(refresh),
            issuer: config.issuer.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation
    }

    fn parse_subject(sub: &str) -> Result<Uuid, ServiceError> {
        Uuid::parse_str(sub).map_err(|_| ServiceError::InvalidToken)
    }
}

impl TokenIssuer for JwtService {
    fn issue_access_token(&self, claims: &IdentityClaims) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: claims.account_id.to_string(),
            email: claims.email.clone(),
            typ: ACCESS_TOKEN_TYPE.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e).into())
    }

    fn issue_refresh_token(
        &self,
        claims: &IdentityClaims,
        session_id: &str,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = now + Duration::days(self.refresh_token_expiry_days);

        let claims = RefreshTokenClaims {
            sub: claims.account_id.to_string(),
            email: claims.email.clone(),
            sid: session_id.to_string(),
            typ: REFRESH_TOKEN_TYPE.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e).into())
    }

    fn verify_access_token(&self, token: &str) -> Result<IdentityClaims, ServiceError> {
        let data = decode::<AccessTokenClaims>(token, &self.access_decoding_key, &self.validation())
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                ServiceError::InvalidToken
            })?;

        if data.claims.typ != ACCESS_TOKEN_TYPE {
            return Err(ServiceError::InvalidToken);
        }

        Ok(IdentityClaims {
            account_id: Self::parse_subject(&data.claims.sub)?,
            email: data.claims.email,
        })
    }

    fn verify_refresh_token(&self, token: &str) -> Result<VerifiedRefreshToken, ServiceError> {
        let data =
            decode::<RefreshTokenClaims>(token, &self.refresh_decoding_key, &self.validation())
                .map_err(|e| {
                    tracing::debug!(error = %e, "Refresh token rejected");
                    ServiceError::InvalidToken
                })?;

        if data.claims.typ != REFRESH_TOKEN_TYPE || data.claims.sid.is_empty() {
            return Err(ServiceError::InvalidToken);
        }

        Ok(VerifiedRefreshToken {
            identity: IdentityClaims {
                account_id: Self::parse_subject(&data.claims.sub)?,
                email: data.claims.email,
            },
            session_id: data.claims.sid,
        })
    }

    fn new_random_id(&self) -> String {
        generate_random_token()
    }

    fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    fn refresh_token_expiry_seconds(&self) -> i64 {
        self.refresh_token_expiry_days * 24 * 60 * 60
    }
}

/// 32 random bytes, hex encoded.
pub fn generate_random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
