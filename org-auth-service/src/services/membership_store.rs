use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::ServiceError;
use crate::models::{
    Invitation, MemberStatus, OrgRole, Organization, OrganizationMember, Team, TeamMember,
};

/// Persistence port for organizations, memberships, invitations and teams.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    // ===== Organizations =====

    /// Insert the organization together with its owner membership.
    async fn create_organization(
        &self,
        organization: &Organization,
        owner: &OrganizationMember,
    ) -> Result<(), ServiceError>;

    async fn find_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Organization>, ServiceError>;

    /// Writes name, description and `updated_utc` only.
    async fn update_organization(&self, organization: &Organization) -> Result<(), ServiceError>;

    /// Removes the organization with its members, invitations and teams.
    async fn delete_organization(&self, organization_id: Uuid) -> Result<(), ServiceError>;

    /// Organizations where the user holds an ACTIVE membership.
    async fn list_organizations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Organization>, ServiceError>;

    // ===== Members =====

    async fn find_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrganizationMember>, ServiceError>;

    async fn list_members(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, ServiceError>;

    async fn update_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    ) -> Result<(), ServiceError>;

    async fn update_member_status(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        status: MemberStatus,
    ) -> Result<(), ServiceError>;

    /// Deletes the membership and the user's team memberships inside the organization.
    async fn delete_member(&self, organization_id: Uuid, user_id: Uuid)
        -> Result<(), ServiceError>;

    // ===== Invitations =====

    async fn create_invitation(&self, invitation: &Invitation) -> Result<(), ServiceError>;

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, ServiceError>;

    async fn list_invitations(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<Invitation>, ServiceError>;

    /// Mark the invitation accepted and create (or reactivate) the membership
    /// as one atomic step.
    ///
    /// Fails `Conflict` if the invitation was already accepted or the user has
    /// an ACTIVE or SUSPENDED membership. A LEFT membership is reactivated with
    /// the invited role.
    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        member: &OrganizationMember,
    ) -> Result<OrganizationMember, ServiceError>;

    // ===== Teams =====

    /// Insert the team and its leader as the first team member.
    async fn create_team(&self, team: &Team) -> Result<(), ServiceError>;

    async fn find_team(&self, team_id: Uuid) -> Result<Option<Team>, ServiceError>;

    /// Writes name, description and `updated_utc` only; the leader changes
    /// through `change_team_leader`.
    async fn update_team(&self, team: &Team) -> Result<(), ServiceError>;

    /// Set a new leader, adding them as a team member if they are not one yet.
    async fn change_team_leader(
        &self,
        team_id: Uuid,
        new_leader_id: Uuid,
    ) -> Result<Team, ServiceError>;

    async fn delete_team(&self, team_id: Uuid) -> Result<(), ServiceError>;

    async fn list_teams(&self, organization_id: Uuid) -> Result<Vec<Team>, ServiceError>;

    async fn teams_led_by(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Team>, ServiceError>;

    async fn find_team_member(
        &self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, ServiceError>;

    /// Fails `Conflict` if the user is already on the team.
    async fn add_team_member(&self, member: &TeamMember) -> Result<(), ServiceError>;

    async fn remove_team_member(&self, team_id: Uuid, user_id: Uuid) -> Result<(), ServiceError>;

    async fn list_team_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[derive(Default)]
struct MembershipState {
    organizations: HashMap<Uuid, Organization>,
    members: HashMap<(Uuid, Uuid), OrganizationMember>,
    invitations: HashMap<Uuid, Invitation>,
    teams: HashMap<Uuid, Team>,
    team_members: HashMap<(Uuid, Uuid), TeamMember>,
}

impl MembershipState {
    fn member_mut(
        &mut self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<&mut OrganizationMember, ServiceError> {
        self.members
            .get_mut(&(organization_id, user_id))
            .ok_or_else(|| ServiceError::not_found("Member not found"))
    }

    fn team_mut(&mut self, team_id: Uuid) -> Result<&mut Team, ServiceError> {
        self.teams
            .get_mut(&team_id)
            .ok_or_else(|| ServiceError::not_found("Team not found"))
    }
}

/// Process-local membership store. All state sits behind one lock so every
/// operation is atomic.
#[derive(Default)]
pub struct InMemoryMembershipStore {
    state: Mutex<MembershipState>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MembershipState>, ServiceError> {
        self.state
            .lock()
            .map_err(|e| anyhow::anyhow!("Membership store lock poisoned: {}", e).into())
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn create_organization(
        &self,
        organization: &Organization,
        owner: &OrganizationMember,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        state
            .organizations
            .insert(organization.organization_id, organization.clone());
        state
            .members
            .insert((owner.organization_id, owner.user_id), owner.clone());
        Ok(())
    }

    async fn find_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Organization>, ServiceError> {
        Ok(self.lock()?.organizations.get(&organization_id).cloned())
    }

    async fn update_organization(&self, organization: &Organization) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let stored = state
            .organizations
            .get_mut(&organization.organization_id)
            .ok_or_else(|| ServiceError::not_found("Organization not found"))?;
        stored.name = organization.name.clone();
        stored.description = organization.description.clone();
        stored.updated_utc = organization.updated_utc;
        Ok(())
    }

    async fn delete_organization(&self, organization_id: Uuid) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        if state.organizations.remove(&organization_id).is_none() {
            return Err(ServiceError::not_found("Organization not found"));
        }

        let team_ids: Vec<Uuid> = state
            .teams
            .values()
            .filter(|t| t.organization_id == organization_id)
            .map(|t| t.team_id)
            .collect();
        state.team_members.retain(|(team_id, _), _| !team_ids.contains(team_id));
        state.teams.retain(|_, t| t.organization_id != organization_id);
        state
            .invitations
            .retain(|_, i| i.organization_id != organization_id);
        state
            .members
            .retain(|(org_id, _), _| *org_id != organization_id);
        Ok(())
    }

    async fn list_organizations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Organization>, ServiceError> {
        let state = self.lock()?;
        let mut orgs: Vec<Organization> = state
            .members
            .values()
            .filter(|m| m.user_id == user_id && m.is_active())
            .filter_map(|m| state.organizations.get(&m.organization_id).cloned())
            .collect();
        orgs.sort_by_key(|o| o.created_utc);
        Ok(orgs)
    }

    async fn find_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrganizationMember>, ServiceError> {
        Ok(self
            .lock()?
            .members
            .get(&(organization_id, user_id))
            .cloned())
    }

    async fn list_members(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, ServiceError> {
        let mut members: Vec<OrganizationMember> = self
            .lock()?
            .members
            .values()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.joined_utc);
        Ok(members)
    }

    async fn update_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let member = state.member_mut(organization_id, user_id)?;
        member.role = role;
        member.updated_utc = Utc::now();
        Ok(())
    }

    async fn update_member_status(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        status: MemberStatus,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let member = state.member_mut(organization_id, user_id)?;
        member.status = status;
        member.updated_utc = Utc::now();
        Ok(())
    }

    async fn delete_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        if state.members.remove(&(organization_id, user_id)).is_none() {
            return Err(ServiceError::not_found("Member not found"));
        }

        let team_ids: Vec<Uuid> = state
            .teams
            .values()
            .filter(|t| t.organization_id == organization_id)
            .map(|t| t.team_id)
            .collect();
        state
            .team_members
            .retain(|(team_id, uid), _| !(*uid == user_id && team_ids.contains(team_id)));
        Ok(())
    }

    async fn create_invitation(&self, invitation: &Invitation) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        if state
            .invitations
            .values()
            .any(|i| i.token_hash == invitation.token_hash)
        {
            return Err(ServiceError::conflict("Invitation token collision"));
        }
        state
            .invitations
            .insert(invitation.invitation_id, invitation.clone());
        Ok(())
    }

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, ServiceError> {
        Ok(self
            .lock()?
            .invitations
            .values()
            .find(|i| i.token_hash == token_hash)
            .cloned())
    }

    async fn list_invitations(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<Invitation>, ServiceError> {
        let mut invitations: Vec<Invitation> = self
            .lock()?
            .invitations
            .values()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect();
        invitations.sort_by_key(|i| i.created_utc);
        Ok(invitations)
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        member: &OrganizationMember,
    ) -> Result<OrganizationMember, ServiceError> {
        let mut state = self.lock()?;

        let invitation = state
            .invitations
            .get(&invitation_id)
            .ok_or_else(|| ServiceError::not_found("Invitation not found"))?;
        if invitation.is_accepted() {
            return Err(ServiceError::conflict("Invitation already accepted"));
        }

        let key = (member.organization_id, member.user_id);
        let stored = match state.members.get(&key) {
            Some(existing) if existing.status != MemberStatus::Left => {
                return Err(ServiceError::conflict(
                    "User is already a member of this organization",
                ));
            }
            Some(existing) => OrganizationMember {
                role: member.role,
                status: MemberStatus::Active,
                updated_utc: Utc::now(),
                ..existing.clone()
            },
            None => member.clone(),
        };

        state.members.insert(key, stored.clone());
        if let Some(invitation) = state.invitations.get_mut(&invitation_id) {
            invitation.accepted_utc = Some(Utc::now());
        }
        Ok(stored)
    }

    async fn create_team(&self, team: &Team) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        state.teams.insert(team.team_id, team.clone());
        state.team_members.insert(
            (team.team_id, team.leader_id),
            TeamMember::new(team.team_id, team.leader_id),
        );
        Ok(())
    }

    async fn find_team(&self, team_id: Uuid) -> Result<Option<Team>, ServiceError> {
        Ok(self.lock()?.teams.get(&team_id).cloned())
    }

    async fn update_team(&self, team: &Team) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let stored = state.team_mut(team.team_id)?;
        stored.name = team.name.clone();
        stored.description = team.description.clone();
        stored.updated_utc = team.updated_utc;
        Ok(())
    }

    async fn change_team_leader(
        &self,
        team_id: Uuid,
        new_leader_id: Uuid,
    ) -> Result<Team, ServiceError> {
        let mut state = self.lock()?;
        let team = state.team_mut(team_id)?;
        team.leader_id = new_leader_id;
        team.updated_utc = Utc::now();
        let updated = team.clone();

        state
            .team_members
            .entry((team_id, new_leader_id))
            .or_insert_with(|| TeamMember::new(team_id, new_leader_id));
        Ok(updated)
    }

    async fn delete_team(&self, team_id: Uuid) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        if state.teams.remove(&team_id).is_none() {
            return Err(ServiceError::not_found("Team not found"));
        }
        state.team_members.retain(|(tid, _), _| *tid != team_id);
        Ok(())
    }

    async fn list_teams(&self, organization_id: Uuid) -> Result<Vec<Team>, ServiceError> {
        let mut teams: Vec<Team> = self
            .lock()?
            .teams
            .values()
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .collect();
        teams.sort_by_key(|t| t.created_utc);
        Ok(teams)
    }

    async fn teams_led_by(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Team>, ServiceError> {
        Ok(self
            .lock()?
            .teams
            .values()
            .filter(|t| t.organization_id == organization_id && t.leader_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_team_member(
        &self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, ServiceError> {
        Ok(self.lock()?.team_members.get(&(team_id, user_id)).cloned())
    }

    async fn add_team_member(&self, member: &TeamMember) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let key = (member.team_id, member.user_id);
        if state.team_members.contains_key(&key) {
            return Err(ServiceError::conflict("User is already a team member"));
        }
        state.team_members.insert(key, member.clone());
        Ok(())
    }

    async fn remove_team_member(&self, team_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        self.lock()?
            .team_members
            .remove(&(team_id, user_id))
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("Team member not found"))
    }

    async fn list_team_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>, ServiceError> {
        let mut members: Vec<TeamMember> = self
            .lock()?
            .team_members
            .values()
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.joined_utc);
        Ok(members)
    }
}
