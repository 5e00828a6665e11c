//! Role-based authorization for organization and team operations.
//!
//! Organization permissions come from a fixed role table. Team rules are a
//! separate, narrower layer keyed on team leadership.

use std::sync::Arc;
use uuid::Uuid;

use super::{MembershipStore, ServiceError};
use crate::models::{OrgRole, OrganizationMember, Team};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    Update,
    DeleteOrg,
    ListMembers,
    Invite,
    UpdateRole,
    RemoveMember,
}

const OWNER_PERMISSIONS: &[Permission] = &[
    Permission::Read,
    Permission::Update,
    Permission::DeleteOrg,
    Permission::ListMembers,
    Permission::Invite,
    Permission::UpdateRole,
    Permission::RemoveMember,
];

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::Read,
    Permission::Update,
    Permission::ListMembers,
    Permission::Invite,
    Permission::UpdateRole,
    Permission::RemoveMember,
];

const MEMBER_PERMISSIONS: &[Permission] = &[Permission::Read, Permission::ListMembers];

/// Organization permissions granted to a role. TEAM_LEAD carries no extra
/// organization rights; its powers are team-scoped.
pub fn permissions_for(role: OrgRole) -> &'static [Permission] {
    match role {
        OrgRole::Owner => OWNER_PERMISSIONS,
        OrgRole::Admin => ADMIN_PERMISSIONS,
        OrgRole::Member | OrgRole::TeamLead => MEMBER_PERMISSIONS,
    }
}

pub fn role_has_permission(role: OrgRole, permission: Permission) -> bool {
    permissions_for(role).contains(&permission)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamAction {
    Create,
    UpdateDetails,
    ManageMembers,
    ChangeLeader,
    Delete,
}

/// Team rules. `team` is `None` only for `Create`, where `leader_id` names the
/// proposed leader.
pub fn check_team_action(
    actor: &OrganizationMember,
    action: TeamAction,
    team: Option<&Team>,
    leader_id: Option<Uuid>,
) -> Result<(), ServiceError> {
    let leads_team = team.is_some_and(|t| t.is_led_by(actor.user_id));

    let allowed = match (action, actor.role) {
        (TeamAction::Create, OrgRole::Owner | OrgRole::Admin) => true,
        // a team lead can only create teams they will lead
        (TeamAction::Create, OrgRole::TeamLead) => leader_id == Some(actor.user_id),
        (TeamAction::Create, OrgRole::Member) => false,
        (TeamAction::UpdateDetails, _) => leads_team,
        (TeamAction::ManageMembers, OrgRole::Owner | OrgRole::Admin) => true,
        (TeamAction::ManageMembers, OrgRole::TeamLead) => leads_team,
        (TeamAction::ManageMembers, OrgRole::Member) => false,
        (TeamAction::ChangeLeader | TeamAction::Delete, role) => {
            matches!(role, OrgRole::Owner | OrgRole::Admin)
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(ServiceError::forbidden("insufficient team permission"))
    }
}

#[derive(Clone)]
pub struct AuthorizationService {
    store: Arc<dyn MembershipStore>,
}

impl AuthorizationService {
    pub fn new(store: Arc<dyn MembershipStore>) -> Self {
        Self { store }
    }

    /// Load the caller's ACTIVE membership or fail `Forbidden("not a member")`.
    pub async fn require_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrganizationMember, ServiceError> {
        match self.store.find_member(organization_id, user_id).await? {
            Some(member) if member.is_active() => Ok(member),
            _ => Err(ServiceError::forbidden("not a member")),
        }
    }

    /// Returns the caller's role for use-case specific follow-up checks.
    pub async fn ensure_has_permission(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        permission: Permission,
    ) -> Result<OrgRole, ServiceError> {
        let member = self.require_member(organization_id, user_id).await?;

        if !role_has_permission(member.role, permission) {
            tracing::debug!(
                organization_id = %organization_id,
                user_id = %user_id,
                role = %member.role,
                ?permission,
                "Permission denied"
            );
            return Err(ServiceError::forbidden("insufficient permission"));
        }

        Ok(member.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemberStatus;

    fn member(role: OrgRole) -> OrganizationMember {
        OrganizationMember::new_active(Uuid::new_v4(), Uuid::new_v4(), role)
    }

    #[test]
    fn test_permission_table() {
        use Permission::*;

        for p in [Read, Update, DeleteOrg, ListMembers, Invite, UpdateRole, RemoveMember] {
            assert!(role_has_permission(OrgRole::Owner, p));
            assert_eq!(role_has_permission(OrgRole::Admin, p), p != DeleteOrg);
            assert_eq!(
                role_has_permission(OrgRole::Member, p),
                matches!(p, Read | ListMembers)
            );
            assert_eq!(
                role_has_permission(OrgRole::TeamLead, p),
                role_has_permission(OrgRole::Member, p)
            );
        }
    }

    #[test]
    fn test_team_create_rules() {
        let owner = member(OrgRole::Owner);
        let lead = member(OrgRole::TeamLead);
        let plain = member(OrgRole::Member);

        assert!(check_team_action(&owner, TeamAction::Create, None, Some(Uuid::new_v4())).is_ok());
        assert!(check_team_action(&lead, TeamAction::Create, None, Some(lead.user_id)).is_ok());
        assert!(check_team_action(&lead, TeamAction::Create, None, Some(Uuid::new_v4())).is_err());
        assert!(check_team_action(&plain, TeamAction::Create, None, Some(plain.user_id)).is_err());
    }

    #[test]
    fn test_only_leader_updates_details() {
        let lead = member(OrgRole::Member);
        let admin = member(OrgRole::Admin);
        let team = Team::new(lead.organization_id, lead.user_id, "Core".to_string(), None);

        assert!(check_team_action(&lead, TeamAction::UpdateDetails, Some(&team), None).is_ok());
        assert!(check_team_action(&admin, TeamAction::UpdateDetails, Some(&team), None).is_err());
    }

    #[test]
    fn test_manage_members_rules() {
        let lead = member(OrgRole::TeamLead);
        let own = Team::new(lead.organization_id, lead.user_id, "Own".to_string(), None);
        let other = Team::new(lead.organization_id, Uuid::new_v4(), "Other".to_string(), None);

        assert!(check_team_action(&lead, TeamAction::ManageMembers, Some(&own), None).is_ok());
        assert!(check_team_action(&lead, TeamAction::ManageMembers, Some(&other), None).is_err());
        assert!(check_team_action(
            &member(OrgRole::Admin),
            TeamAction::ManageMembers,
            Some(&other),
            None
        )
        .is_ok());
        assert!(check_team_action(
            &member(OrgRole::Member),
            TeamAction::ManageMembers,
            Some(&other),
            None
        )
        .is_err());
    }

    #[test]
    fn test_leader_change_and_delete_need_admin() {
        let lead = member(OrgRole::TeamLead);
        let team = Team::new(lead.organization_id, lead.user_id, "Own".to_string(), None);

        for action in [TeamAction::ChangeLeader, TeamAction::Delete] {
            assert!(check_team_action(&lead, action, Some(&team), None).is_err());
            assert!(check_team_action(&member(OrgRole::Owner), action, Some(&team), None).is_ok());
        }
    }

    #[tokio::test]
    async fn test_ensure_has_permission() {
        let store = Arc::new(crate::services::InMemoryMembershipStore::new());
        let authz = AuthorizationService::new(store.clone());

        let owner = Uuid::new_v4();
        let org = crate::models::Organization::new("Acme".to_string(), None, owner);
        store
            .create_organization(
                &org,
                &OrganizationMember::new_active(org.organization_id, owner, OrgRole::Owner),
            )
            .await
            .unwrap();

        assert_eq!(
            authz
                .ensure_has_permission(org.organization_id, owner, Permission::DeleteOrg)
                .await
                .unwrap(),
            OrgRole::Owner
        );

        let err = authz
            .ensure_has_permission(org.organization_id, Uuid::new_v4(), Permission::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(msg) if msg == "not a member"));

        store
            .update_member_status(org.organization_id, owner, MemberStatus::Suspended)
            .await
            .unwrap();
        assert!(authz
            .ensure_has_permission(org.organization_id, owner, Permission::Read)
            .await
            .is_err());
    }
}
