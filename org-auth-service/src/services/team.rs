//! Team use cases, gated by leadership-based rules on top of organization roles.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::authz::{check_team_action, AuthorizationService, Permission, TeamAction};
use super::organization::validate_name;
use super::{DomainEvent, EventPublisher, MembershipStore, ServiceError};
use crate::models::{Team, TeamMember};

#[derive(Clone)]
pub struct TeamService {
    store: Arc<dyn MembershipStore>,
    authz: AuthorizationService,
    events: Arc<dyn EventPublisher>,
}

impl TeamService {
    pub fn new(
        store: Arc<dyn MembershipStore>,
        authz: AuthorizationService,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            authz,
            events,
        }
    }

    /// The leader defaults to the caller.
    pub async fn create_team(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
        name: &str,
        description: Option<String>,
        leader_id: Option<Uuid>,
    ) -> Result<Team, ServiceError> {
        let actor = self.authz.require_member(organization_id, actor_id).await?;
        let leader_id = leader_id.unwrap_or(actor_id);
        check_team_action(&actor, TeamAction::Create, None, Some(leader_id))?;

        self.ensure_active_member(organization_id, leader_id, "team leader")
            .await?;

        let team = Team::new(organization_id, leader_id, validate_name(name)?, description);
        self.store.create_team(&team).await?;

        tracing::info!(
            organization_id = %organization_id,
            team_id = %team.team_id,
            leader_id = %leader_id,
            "Team created"
        );
        self.events.publish(DomainEvent::TeamCreated {
            organization_id,
            team_id: team.team_id,
            leader_id,
        });
        Ok(team)
    }

    pub async fn get_team(&self, actor_id: Uuid, team_id: Uuid) -> Result<Team, ServiceError> {
        let team = self.load_team(team_id).await?;
        self.authz
            .ensure_has_permission(team.organization_id, actor_id, Permission::Read)
            .await?;
        Ok(team)
    }

    /// A team outside `organization_id` is not found before any role check,
    /// so callers cannot learn that it exists elsewhere.
    pub async fn get_team_in_org(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
        team_id: Uuid,
    ) -> Result<Team, ServiceError> {
        let team = self.load_team(team_id).await?;
        if team.organization_id != organization_id {
            return Err(ServiceError::not_found("Team not found"));
        }
        self.authz
            .ensure_has_permission(organization_id, actor_id, Permission::Read)
            .await?;
        Ok(team)
    }

    pub async fn list_teams(
        &self,
        actor_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<Team>, ServiceError> {
        self.authz
            .ensure_has_permission(organization_id, actor_id, Permission::Read)
            .await?;
        self.store.list_teams(organization_id).await
    }

    pub async fn list_team_members(
        &self,
        actor_id: Uuid,
        team_id: Uuid,
    ) -> Result<Vec<TeamMember>, ServiceError> {
        let team = self.get_team(actor_id, team_id).await?;
        self.store.list_team_members(team.team_id).await
    }

    /// Leader only. `description: Some(None)` clears the description.
    pub async fn update_team(
        &self,
        actor_id: Uuid,
        team_id: Uuid,
        name: Option<&str>,
        description: Option<Option<String>>,
    ) -> Result<Team, ServiceError> {
        let mut team = self.load_team(team_id).await?;
        let actor = self
            .authz
            .require_member(team.organization_id, actor_id)
            .await?;
        check_team_action(&actor, TeamAction::UpdateDetails, Some(&team), None)?;

        if let Some(name) = name {
            team.name = validate_name(name)?;
        }
        if let Some(description) = description {
            team.description = description;
        }
        team.updated_utc = Utc::now();
        self.store.update_team(&team).await?;

        tracing::info!(team_id = %team_id, updated_by = %actor_id, "Team updated");
        self.events.publish(DomainEvent::TeamUpdated {
            organization_id: team.organization_id,
            team_id,
            updated_by: actor_id,
        });
        Ok(team)
    }

    pub async fn add_team_member(
        &self,
        actor_id: Uuid,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<TeamMember, ServiceError> {
        let team = self.load_team(team_id).await?;
        let actor = self
            .authz
            .require_member(team.organization_id, actor_id)
            .await?;
        check_team_action(&actor, TeamAction::ManageMembers, Some(&team), None)?;

        self.ensure_active_member(team.organization_id, user_id, "team member")
            .await?;

        let member = TeamMember::new(team_id, user_id);
        self.store.add_team_member(&member).await?;

        tracing::info!(team_id = %team_id, user_id = %user_id, added_by = %actor_id, "Team member added");
        self.events.publish(DomainEvent::TeamMemberAdded {
            team_id,
            user_id,
            added_by: actor_id,
        });
        Ok(member)
    }

    pub async fn remove_team_member(
        &self,
        actor_id: Uuid,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        let team = self.load_team(team_id).await?;
        let actor = self
            .authz
            .require_member(team.organization_id, actor_id)
            .await?;
        check_team_action(&actor, TeamAction::ManageMembers, Some(&team), None)?;

        if team.is_led_by(user_id) {
            return Err(ServiceError::forbidden("the team leader cannot be removed"));
        }

        self.store.remove_team_member(team_id, user_id).await?;

        tracing::info!(team_id = %team_id, user_id = %user_id, removed_by = %actor_id, "Team member removed");
        self.events.publish(DomainEvent::TeamMemberRemoved {
            team_id,
            user_id,
            removed_by: actor_id,
        });
        Ok(())
    }

    pub async fn change_team_leader(
        &self,
        actor_id: Uuid,
        team_id: Uuid,
        new_leader_id: Uuid,
    ) -> Result<Team, ServiceError> {
        let team = self.load_team(team_id).await?;
        let actor = self
            .authz
            .require_member(team.organization_id, actor_id)
            .await?;
        check_team_action(&actor, TeamAction::ChangeLeader, Some(&team), None)?;

        if team.is_led_by(new_leader_id) {
            return Ok(team);
        }
        self.ensure_active_member(team.organization_id, new_leader_id, "team leader")
            .await?;

        let updated = self
            .store
            .change_team_leader(team_id, new_leader_id)
            .await?;

        tracing::info!(
            team_id = %team_id,
            old_leader_id = %team.leader_id,
            new_leader_id = %new_leader_id,
            "Team leader changed"
        );
        self.events.publish(DomainEvent::TeamLeaderChanged {
            team_id,
            old_leader_id: team.leader_id,
            new_leader_id,
        });
        Ok(updated)
    }

    pub async fn delete_team(&self, actor_id: Uuid, team_id: Uuid) -> Result<(), ServiceError> {
        let team = self.load_team(team_id).await?;
        let actor = self
            .authz
            .require_member(team.organization_id, actor_id)
            .await?;
        check_team_action(&actor, TeamAction::Delete, Some(&team), None)?;

        self.store.delete_team(team_id).await?;

        tracing::info!(team_id = %team_id, deleted_by = %actor_id, "Team deleted");
        self.events.publish(DomainEvent::TeamDeleted {
            organization_id: team.organization_id,
            team_id,
            deleted_by: actor_id,
        });
        Ok(())
    }

    async fn load_team(&self, team_id: Uuid) -> Result<Team, ServiceError> {
        self.store
            .find_team(team_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Team not found"))
    }

    async fn ensure_active_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        what: &str,
    ) -> Result<(), ServiceError> {
        match self.store.find_member(organization_id, user_id).await? {
            Some(member) if member.is_active() => Ok(()),
            _ => Err(ServiceError::invalid_input(format!(
                "{} must be an active organization member",
                what
            ))),
        }
    }
}
