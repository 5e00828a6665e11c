//! Organization model - the tenant boundary for roles and teams.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Organization entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[serde(rename = "id")]
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    #[serde(rename = "createdAt")]
    pub created_utc: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_utc: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: String, description: Option<String>, created_by: Uuid) -> Self {
        let now = Utc::now();
        Self {
            organization_id: Uuid::new_v4(),
            name,
            description,
            created_by,
            created_utc: now,
            updated_utc: now,
        }
    }
}
