//! Account model - login identity and session state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Optional profile fields captured at registration or from an identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// An outstanding email verification token.
///
/// Token and expiry always travel together; an account without one has no
/// active verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVerification {
    pub token: String,
    pub expiry_utc: DateTime<Utc>,
}

impl PendingVerification {
    pub fn new(token: String, ttl: Duration) -> Self {
        Self {
            token,
            expiry_utc: Utc::now() + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }
}

/// Account entity.
#[derive(Debug, Clone)]
pub struct Account {
    pub account_id: Uuid,
    pub email: String,
    /// `None` for accounts created through an external identity provider.
    pub password_hash: Option<String>,
    pub profile: AccountProfile,
    pub is_verified: bool,
    pub verification: Option<PendingVerification>,
    /// Identifier of the one refresh token currently considered valid.
    pub session_marker: Option<String>,
    pub external_id: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Account {
    /// Create an unverified local account.
    pub fn new_local(email: String, password_hash: String, profile: AccountProfile) -> Self {
        let now = Utc::now();
        Self {
            account_id: Uuid::new_v4(),
            email,
            password_hash: Some(password_hash),
            profile,
            is_verified: false,
            verification: None,
            session_marker: None,
            external_id: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Create a verified, password-less account owned by an external identity.
    pub fn new_external(email: String, external_id: String, profile: AccountProfile) -> Self {
        let now = Utc::now();
        Self {
            account_id: Uuid::new_v4(),
            email,
            password_hash: None,
            profile,
            is_verified: true,
            verification: None,
            session_marker: None,
            external_id: Some(external_id),
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Convert to sanitized response (no secrets).
    pub fn sanitized(&self) -> AccountResponse {
        AccountResponse::from(self)
    }
}

/// Account representation safe to return to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for AccountResponse {
    fn from(a: &Account) -> Self {
        Self {
            id: a.account_id,
            email: a.email.clone(),
            first_name: a.profile.first_name.clone(),
            last_name: a.profile.last_name.clone(),
            avatar_url: a.profile.avatar_url.clone(),
            is_verified: a.is_verified,
            has_password: a.has_password(),
            created_at: a.created_utc,
            updated_at: a.updated_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_account_has_no_secrets() {
        let mut account = Account::new_local(
            "alice@example.com".to_string(),
            "$argon2id$fake".to_string(),
            AccountProfile::default(),
        );
        account.session_marker = Some("marker".to_string());

        let json = serde_json::to_value(account.sanitized()).unwrap();
        assert_eq!(json["email"], "alice@example.com");
        assert_eq!(json["isVerified"], false);
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("sessionMarker").is_none());
    }

    #[test]
    fn test_pending_verification_expiry() {
        let pending = PendingVerification::new("t".to_string(), Duration::minutes(30));
        assert!(!pending.is_expired_at(Utc::now()));
        assert!(pending.is_expired_at(Utc::now() + Duration::minutes(31)));
    }
}
