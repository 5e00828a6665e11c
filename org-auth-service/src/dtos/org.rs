use serde::{Deserialize, Serialize};
use validator::Validate;

use super::double_option;
use crate::models::{InvitationResponse, OrgRole};
use crate::services::IssuedInvitation;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: String,

    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InviteMemberRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub role: OrgRole,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: OrgRole,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInvitationRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

/// Returned once to the inviter; only the token hash is stored.
#[derive(Debug, Serialize)]
pub struct InvitationCreatedResponse {
    pub invitation: InvitationResponse,
    pub token: String,
}

impl From<IssuedInvitation> for InvitationCreatedResponse {
    fn from(issued: IssuedInvitation) -> Self {
        Self {
            invitation: issued.invitation.into(),
            token: issued.token,
        }
    }
}
