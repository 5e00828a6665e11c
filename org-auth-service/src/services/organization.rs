//! Organization, membership and invitation use cases.
//!
//! Every mutation passes `ensure_has_permission` first; the owner rules that
//! are not plain permissions are enforced here.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::authz::{AuthorizationService, Permission};
use super::jwt::generate_random_token;
use super::{AccountStore, DomainEvent, EventPublisher, MembershipStore, PolicyService, ServiceError};
use crate::models::{
    hash_token, Invitation, MemberStatus, OrgRole, Organization, OrganizationMember,
};

const ORG_NAME_MAX_LENGTH: usize = 100;

/// A stored invitation plus the raw token, which exists only in this value.
#[derive(Debug, Clone)]
pub struct IssuedInvitation {
    pub invitation: Invitation,
    pub token: String,
}

#[derive(Clone)]
pub struct OrganizationService {
    store: Arc<dyn MembershipStore>,
    accounts: Arc<dyn AccountStore>,
    authz: AuthorizationService,
    events: Arc<dyn EventPublisher>,
    invitation_ttl: Duration,
}

impl OrganizationService {
    pub fn new(
        store: Arc<dyn MembershipStore>,
        accounts: Arc<dyn AccountStore>,
        authz: AuthorizationService,
        events: Arc<dyn EventPublisher>,
        invitation_ttl: Duration,
    ) -> Self {
        Self {
            store,
            accounts,
            authz,
            events,
            invitation_ttl,
        }
    }

    // ===== Organizations =====

    pub async fn create_organization(
        &self,
        actor_id: Uuid,
        name: &str,
        description: Option<String>,
    ) -> Result<Organization, ServiceError> {
        let name = validate_name(name)?;

        let organization = Organization::new(name, description, actor_id);
        let owner =
            OrganizationMember::new_active(organization.organization_id, actor_id, OrgRole::Owner);
        self.store.create_organization(&organization, &owner).await?;

        tracing::info!(
            organization_id = %organization.organization_id,
            owner_id = %actor_id,
            "Organization created"
        );
        Ok(organization)
    }

    pub async fn get_organization(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Organization, ServiceError> {
        self.authz
            .ensure_has_permission(organization_id, actor_id, Permission::Read)
            .await?;
        self.load_organization(organization_id).await
    }

    pub async fn list_organizations(
        &self,
        actor_id: Uuid,
    ) -> Result<Vec<Organization>, ServiceError> {
        self.store.list_organizations_for_user(actor_id).await
    }

    /// `description: Some(None)` clears the description.
    pub async fn update_organization(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
        name: Option<&str>,
        description: Option<Option<String>>,
    ) -> Result<Organization, ServiceError> {
        self.authz
            .ensure_has_permission(organization_id, actor_id, Permission::Update)
            .await?;
        let mut organization = self.load_organization(organization_id).await?;

        if let Some(name) = name {
            organization.name = validate_name(name)?;
        }
        if let Some(description) = description {
            organization.description = description;
        }
        organization.updated_utc = Utc::now();
        self.store.update_organization(&organization).await?;

        tracing::info!(organization_id = %organization_id, updated_by = %actor_id, "Organization updated");
        Ok(organization)
    }

    pub async fn delete_organization(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.authz
            .ensure_has_permission(organization_id, actor_id, Permission::DeleteOrg)
            .await?;
        self.store.delete_organization(organization_id).await?;

        tracing::info!(organization_id = %organization_id, deleted_by = %actor_id, "Organization deleted");
        self.events.publish(DomainEvent::OrganizationDeleted {
            organization_id,
            deleted_by: actor_id,
        });
        Ok(())
    }

    // ===== Members =====

    pub async fn list_members(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, ServiceError> {
        self.authz
            .ensure_has_permission(organization_id, actor_id, Permission::ListMembers)
            .await?;
        self.store.list_members(organization_id).await
    }

    /// Owner rules: only the owner may touch the owner's row, the owner role
    /// can never be given up, and nobody can be made a second owner.
    pub async fn update_member_role(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
        target_id: Uuid,
        new_role: OrgRole,
    ) -> Result<OrganizationMember, ServiceError> {
        self.authz
            .ensure_has_permission(organization_id, actor_id, Permission::UpdateRole)
            .await?;

        let mut target = self.load_member(organization_id, target_id).await?;

        if target.is_owner() {
            if actor_id != target_id {
                return Err(ServiceError::forbidden(
                    "only the owner can change the owner's role",
                ));
            }
            if new_role != OrgRole::Owner {
                return Err(ServiceError::forbidden(
                    "the owner cannot give up the owner role",
                ));
            }
            return Ok(target);
        }

        if new_role == OrgRole::Owner {
            return Err(ServiceError::forbidden("the owner role cannot be assigned"));
        }

        if !target.is_active() {
            return Err(ServiceError::invalid_input("member is not active"));
        }

        let old_role = target.role;
        if old_role == new_role {
            return Ok(target);
        }

        self.store
            .update_member_role(organization_id, target_id, new_role)
            .await?;
        target.role = new_role;
        target.updated_utc = Utc::now();

        tracing::info!(
            organization_id = %organization_id,
            user_id = %target_id,
            changed_by = %actor_id,
            old_role = %old_role,
            new_role = %new_role,
            "Member role changed"
        );
        self.events.publish(DomainEvent::MemberRoleChanged {
            organization_id,
            user_id: target_id,
            changed_by: actor_id,
            old_role,
            new_role,
        });
        Ok(target)
    }

    pub async fn remove_member(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
        target_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.authz
            .ensure_has_permission(organization_id, actor_id, Permission::RemoveMember)
            .await?;

        let target = self.load_member(organization_id, target_id).await?;
        if target.is_owner() {
            return Err(ServiceError::forbidden("the owner cannot be removed"));
        }
        self.ensure_leads_no_team(organization_id, target_id).await?;

        self.store.delete_member(organization_id, target_id).await?;

        tracing::info!(
            organization_id = %organization_id,
            user_id = %target_id,
            removed_by = %actor_id,
            "Member removed"
        );
        self.events.publish(DomainEvent::MemberRemoved {
            organization_id,
            user_id: target_id,
            removed_by: actor_id,
        });
        Ok(())
    }

    pub async fn leave_organization(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), ServiceError> {
        let member = self.authz.require_member(organization_id, actor_id).await?;
        if member.is_owner() {
            return Err(ServiceError::forbidden("the owner cannot leave the organization"));
        }
        self.ensure_leads_no_team(organization_id, actor_id).await?;

        self.store
            .update_member_status(organization_id, actor_id, MemberStatus::Left)
            .await?;

        // team membership requires an active organization membership
        for team in self.store.list_teams(organization_id).await? {
            if self
                .store
                .find_team_member(team.team_id, actor_id)
                .await?
                .is_some()
            {
                self.store
                    .remove_team_member(team.team_id, actor_id)
                    .await?;
            }
        }

        tracing::info!(organization_id = %organization_id, user_id = %actor_id, "Member left");
        self.events.publish(DomainEvent::MemberLeft {
            organization_id,
            user_id: actor_id,
        });
        Ok(())
    }

    // ===== Invitations =====

    pub async fn invite_member(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
        email: &str,
        role: OrgRole,
    ) -> Result<IssuedInvitation, ServiceError> {
        self.authz
            .ensure_has_permission(organization_id, actor_id, Permission::Invite)
            .await?;

        if role == OrgRole::Owner {
            return Err(ServiceError::forbidden("invitations cannot grant the owner role"));
        }

        let email = PolicyService::normalize_email(email);
        PolicyService::validate_email(&email)?;

        if let Some(account) = self.accounts.find_by_email(&email).await? {
            let existing = self
                .store
                .find_member(organization_id, account.account_id)
                .await?;
            if existing.is_some_and(|m| m.is_active()) {
                return Err(ServiceError::conflict(
                    "User is already a member of this organization",
                ));
            }
        }

        let token = generate_random_token();
        let invitation = Invitation::new(
            organization_id,
            actor_id,
            email,
            role,
            &token,
            self.invitation_ttl,
        );
        self.store.create_invitation(&invitation).await?;

        tracing::info!(
            organization_id = %organization_id,
            invitation_id = %invitation.invitation_id,
            inviter_id = %actor_id,
            role = %role,
            "Member invited"
        );
        self.events.publish(DomainEvent::MemberInvited {
            organization_id,
            invitation_id: invitation.invitation_id,
            inviter_id: actor_id,
            email: invitation.email.clone(),
            role,
            token: token.clone(),
        });

        Ok(IssuedInvitation { invitation, token })
    }

    pub async fn list_invitations(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<Invitation>, ServiceError> {
        self.authz
            .ensure_has_permission(organization_id, actor_id, Permission::Invite)
            .await?;
        self.store.list_invitations(organization_id).await
    }

    /// Checks, in order: already accepted, expired, invitee email, existing membership.
    pub async fn accept_invitation(
        &self,
        actor_id: Uuid,
        token: &str,
    ) -> Result<OrganizationMember, ServiceError> {
        let invitation = self
            .store
            .find_invitation_by_token_hash(&hash_token(token))
            .await?
            .ok_or_else(|| ServiceError::not_found("Invitation not found"))?;

        if invitation.is_accepted() {
            return Err(ServiceError::conflict("Invitation already accepted"));
        }
        if invitation.is_expired_at(Utc::now()) {
            return Err(ServiceError::TokenExpired);
        }

        let account = self
            .accounts
            .find_by_id(actor_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Account not found"))?;
        if account.email != invitation.email {
            return Err(ServiceError::forbidden(
                "invitation was issued to a different email",
            ));
        }

        let member = self
            .store
            .accept_invitation(
                invitation.invitation_id,
                &OrganizationMember::new_active(
                    invitation.organization_id,
                    actor_id,
                    invitation.role,
                ),
            )
            .await?;

        tracing::info!(
            organization_id = %invitation.organization_id,
            invitation_id = %invitation.invitation_id,
            user_id = %actor_id,
            "Invitation accepted"
        );
        self.events.publish(DomainEvent::InvitationAccepted {
            organization_id: invitation.organization_id,
            invitation_id: invitation.invitation_id,
            user_id: actor_id,
            role: member.role,
        });
        Ok(member)
    }

    async fn load_organization(&self, organization_id: Uuid) -> Result<Organization, ServiceError> {
        self.store
            .find_organization(organization_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Organization not found"))
    }

    async fn load_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrganizationMember, ServiceError> {
        self.store
            .find_member(organization_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Member not found"))
    }

    async fn ensure_leads_no_team(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        if self
            .store
            .teams_led_by(organization_id, user_id)
            .await?
            .is_empty()
        {
            Ok(())
        } else {
            Err(ServiceError::conflict(
                "member leads a team; reassign team leadership first",
            ))
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > ORG_NAME_MAX_LENGTH {
        return Err(ServiceError::invalid_input(format!(
            "name must be 1 to {} characters",
            ORG_NAME_MAX_LENGTH
        )));
    }
    Ok(name.to_string())
}
