//! Typed domain events fanned out to downstream subscribers.
//!
//! Publishing is best-effort: a publisher never fails the use case that emitted
//! the event, and a bus with no subscribers simply drops it.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::OrgRole;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    AccountRegistered {
        account_id: Uuid,
        email: String,
    },
    MemberInvited {
        organization_id: Uuid,
        invitation_id: Uuid,
        inviter_id: Uuid,
        email: String,
        role: OrgRole,
        /// Raw invite token, for the subscriber that delivers the invitation.
        token: String,
    },
    InvitationAccepted {
        organization_id: Uuid,
        invitation_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    },
    MemberRoleChanged {
        organization_id: Uuid,
        user_id: Uuid,
        changed_by: Uuid,
        old_role: OrgRole,
        new_role: OrgRole,
    },
    MemberRemoved {
        organization_id: Uuid,
        user_id: Uuid,
        removed_by: Uuid,
    },
    MemberLeft {
        organization_id: Uuid,
        user_id: Uuid,
    },
    OrganizationDeleted {
        organization_id: Uuid,
        deleted_by: Uuid,
    },
    TeamCreated {
        organization_id: Uuid,
        team_id: Uuid,
        leader_id: Uuid,
    },
    TeamUpdated {
        organization_id: Uuid,
        team_id: Uuid,
        updated_by: Uuid,
    },
    TeamDeleted {
        organization_id: Uuid,
        team_id: Uuid,
        deleted_by: Uuid,
    },
    TeamMemberAdded {
        team_id: Uuid,
        user_id: Uuid,
        added_by: Uuid,
    },
    TeamMemberRemoved {
        team_id: Uuid,
        user_id: Uuid,
        removed_by: Uuid,
    },
    TeamLeaderChanged {
        team_id: Uuid,
        old_leader_id: Uuid,
        new_leader_id: Uuid,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::AccountRegistered { .. } => "account.registered",
            DomainEvent::MemberInvited { .. } => "member.invited",
            DomainEvent::InvitationAccepted { .. } => "invitation.accepted",
            DomainEvent::MemberRoleChanged { .. } => "member.role_changed",
            DomainEvent::MemberRemoved { .. } => "member.removed",
            DomainEvent::MemberLeft { .. } => "member.left",
            DomainEvent::OrganizationDeleted { .. } => "organization.deleted",
            DomainEvent::TeamCreated { .. } => "team.created",
            DomainEvent::TeamUpdated { .. } => "team.updated",
            DomainEvent::TeamDeleted { .. } => "team.deleted",
            DomainEvent::TeamMemberAdded { .. } => "team.member_added",
            DomainEvent::TeamMemberRemoved { .. } => "team.member_removed",
            DomainEvent::TeamLeaderChanged { .. } => "team.leader_changed",
        }
    }
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Fan-out over a tokio broadcast channel. Lagging subscribers lose the oldest events.
#[derive(Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for BroadcastEventPublisher {
    fn publish(&self, event: DomainEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!(event = name, receivers, "Event published"),
            Err(_) => tracing::debug!(event = name, "Event dropped: no subscribers"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, _event: DomainEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let bus = BroadcastEventPublisher::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let event = DomainEvent::MemberLeft {
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        };
        bus.publish(event.clone());

        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = BroadcastEventPublisher::new(4);
        bus.publish(DomainEvent::AccountRegistered {
            account_id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
        });
    }
}
