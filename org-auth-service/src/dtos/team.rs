use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::double_option;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: String,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    /// Defaults to the caller.
    pub leader_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTeamRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTeamMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTeamLeaderRequest {
    pub leader_id: Uuid,
}
