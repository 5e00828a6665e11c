//! Team model - leader-owned groups inside an organization.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Team entity. The leader is always also a team member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    #[serde(rename = "id")]
    pub team_id: Uuid,
    pub organization_id: Uuid,
    pub leader_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_utc: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_utc: DateTime<Utc>,
}

impl Team {
    pub fn new(
        organization_id: Uuid,
        leader_id: Uuid,
        name: String,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            team_id: Uuid::new_v4(),
            organization_id,
            leader_id,
            name,
            description,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_led_by(&self, user_id: Uuid) -> bool {
        self.leader_id == user_id
    }
}

/// TeamMember entity, unique per (team_id, user_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub team_id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "joinedAt")]
    pub joined_utc: DateTime<Utc>,
}

impl TeamMember {
    pub fn new(team_id: Uuid, user_id: Uuid) -> Self {
        Self {
            team_id,
            user_id,
            joined_utc: Utc::now(),
        }
    }
}
