//! Invitation model - pending offers to join an organization with a role.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::OrgRole;

/// Invitation entity.
///
/// Only the SHA-256 of the invite token is stored; the raw token is handed to
/// the invitee once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub invitation_id: Uuid,
    pub organization_id: Uuid,
    pub inviter_id: Uuid,
    pub email: String,
    pub role: OrgRole,
    pub token_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub accepted_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Invitation {
    /// Create a new invitation expiring `ttl` after now.
    pub fn new(
        organization_id: Uuid,
        inviter_id: Uuid,
        email: String,
        role: OrgRole,
        raw_token: &str,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            invitation_id: Uuid::new_v4(),
            organization_id,
            inviter_id,
            email,
            role,
            token_hash: hash_token(raw_token),
            expiry_utc: now + ttl,
            accepted_utc: None,
            created_utc: now,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted_utc.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }
}

/// Hash an invite token for storage and lookup.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Invitation response for API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub inviter_id: Uuid,
    pub email: String,
    pub role: OrgRole,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Invitation> for InvitationResponse {
    fn from(i: Invitation) -> Self {
        Self {
            id: i.invitation_id,
            organization_id: i.organization_id,
            inviter_id: i.inviter_id,
            email: i.email,
            role: i.role,
            expires_at: i.expiry_utc,
            accepted_at: i.accepted_utc,
            created_at: i.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invitation_stores_hash_not_token() {
        let invitation = Invitation::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "bob@example.com".to_string(),
            OrgRole::Member,
            "raw-token",
            Duration::days(7),
        );

        assert_ne!(invitation.token_hash, "raw-token");
        assert_eq!(invitation.token_hash, hash_token("raw-token"));
        assert!(!invitation.is_accepted());
        assert!(!invitation.is_expired_at(Utc::now()));
        assert!(invitation.is_expired_at(Utc::now() + Duration::days(8)));
    }
}
