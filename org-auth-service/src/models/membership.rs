//! Organization membership model - roles and lifecycle status per (org, user).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Organization-scoped role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgRole {
    Owner,
    Admin,
    Member,
    TeamLead,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Owner => "OWNER",
            OrgRole::Admin => "ADMIN",
            OrgRole::Member => "MEMBER",
            OrgRole::TeamLead => "TEAM_LEAD",
        }
    }
}

impl fmt::Display for OrgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrgRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(OrgRole::Owner),
            "ADMIN" => Ok(OrgRole::Admin),
            "MEMBER" => Ok(OrgRole::Member),
            "TEAM_LEAD" => Ok(OrgRole::TeamLead),
            _ => Err(format!("Invalid organization role: {}", s)),
        }
    }
}

/// Membership lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Invited,
    Active,
    Suspended,
    Left,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Invited => "INVITED",
            MemberStatus::Active => "ACTIVE",
            MemberStatus::Suspended => "SUSPENDED",
            MemberStatus::Left => "LEFT",
        }
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INVITED" => Ok(MemberStatus::Invited),
            "ACTIVE" => Ok(MemberStatus::Active),
            "SUSPENDED" => Ok(MemberStatus::Suspended),
            "LEFT" => Ok(MemberStatus::Left),
            _ => Err(format!("Invalid member status: {}", s)),
        }
    }
}

/// OrganizationMember entity, unique per (organization_id, user_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationMember {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: OrgRole,
    pub status: MemberStatus,
    #[serde(rename = "joinedAt")]
    pub joined_utc: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_utc: DateTime<Utc>,
}

impl OrganizationMember {
    pub fn new_active(organization_id: Uuid, user_id: Uuid, role: OrgRole) -> Self {
        let now = Utc::now();
        Self {
            organization_id,
            user_id,
            role,
            status: MemberStatus::Active,
            joined_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    pub fn is_owner(&self) -> bool {
        self.role == OrgRole::Owner
    }
}
