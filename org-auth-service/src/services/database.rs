//! PostgreSQL adapter for the account and membership stores.
//!
//! Rows are read into `*Row` structs and converted into domain entities here,
//! so nothing above this module sees column encodings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use super::{AccountStore, MembershipStore, ServiceError};
use crate::models::{
    Account, AccountProfile, Invitation, MemberStatus, OrgRole, Organization, OrganizationMember,
    PendingVerification, Team, TeamMember,
};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Database health check failed");
                ServiceError::from(e)
            })?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn corrupt_row(msg: String) -> ServiceError {
    ServiceError::Internal(anyhow::anyhow!("Corrupt row: {}", msg))
}

// ==================== Row mapping ====================

#[derive(Debug, FromRow)]
struct AccountRow {
    account_id: Uuid,
    email: String,
    password_hash: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    avatar_url: Option<String>,
    is_verified: bool,
    verification_token: Option<String>,
    verification_expiry_utc: Option<DateTime<Utc>>,
    session_marker: Option<String>,
    external_id: Option<String>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = ServiceError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let verification = match (row.verification_token, row.verification_expiry_utc) {
            (Some(token), Some(expiry_utc)) => Some(PendingVerification { token, expiry_utc }),
            (None, None) => None,
            _ => {
                return Err(corrupt_row(format!(
                    "account {} has a verification token without expiry",
                    row.account_id
                )))
            }
        };

        Ok(Account {
            account_id: row.account_id,
            email: row.email,
            password_hash: row.password_hash,
            profile: AccountProfile {
                first_name: row.first_name,
                last_name: row.last_name,
                avatar_url: row.avatar_url,
            },
            is_verified: row.is_verified,
            verification,
            session_marker: row.session_marker,
            external_id: row.external_id,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrganizationRow {
    organization_id: Uuid,
    name: String,
    description: Option<String>,
    created_by: Uuid,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            organization_id: row.organization_id,
            name: row.name,
            description: row.description,
            created_by: row.created_by,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct MemberRow {
    organization_id: Uuid,
    user_id: Uuid,
    role_code: String,
    status_code: String,
    joined_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<MemberRow> for OrganizationMember {
    type Error = ServiceError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        Ok(OrganizationMember {
            organization_id: row.organization_id,
            user_id: row.user_id,
            role: row.role_code.parse().map_err(corrupt_row)?,
            status: row.status_code.parse().map_err(corrupt_row)?,
            joined_utc: row.joined_utc,
            updated_utc: row.updated_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct InvitationRow {
    invitation_id: Uuid,
    organization_id: Uuid,
    inviter_id: Uuid,
    email: String,
    role_code: String,
    token_hash: String,
    expiry_utc: DateTime<Utc>,
    accepted_utc: Option<DateTime<Utc>>,
    created_utc: DateTime<Utc>,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = ServiceError;

    fn try_from(row: InvitationRow) -> Result<Self, Self::Error> {
        Ok(Invitation {
            invitation_id: row.invitation_id,
            organization_id: row.organization_id,
            inviter_id: row.inviter_id,
            email: row.email,
            role: row.role_code.parse().map_err(corrupt_row)?,
            token_hash: row.token_hash,
            expiry_utc: row.expiry_utc,
            accepted_utc: row.accepted_utc,
            created_utc: row.created_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct TeamRow {
    team_id: Uuid,
    organization_id: Uuid,
    leader_id: Uuid,
    name: String,
    description: Option<String>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<TeamRow> for Team {
    fn from(row: TeamRow) -> Self {
        Team {
            team_id: row.team_id,
            organization_id: row.organization_id,
            leader_id: row.leader_id,
            name: row.name,
            description: row.description,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct TeamMemberRow {
    team_id: Uuid,
    user_id: Uuid,
    joined_utc: DateTime<Utc>,
}

impl From<TeamMemberRow> for TeamMember {
    fn from(row: TeamMemberRow) -> Self {
        TeamMember {
            team_id: row.team_id,
            user_id: row.user_id,
            joined_utc: row.joined_utc,
        }
    }
}

fn map_members(rows: Vec<MemberRow>) -> Result<Vec<OrganizationMember>, ServiceError> {
    rows.into_iter().map(OrganizationMember::try_from).collect()
}

const ACCOUNT_COLUMNS: &str = "account_id, email, password_hash, first_name, last_name, \
     avatar_url, is_verified, verification_token, verification_expiry_utc, session_marker, \
     external_id, created_utc, updated_utc";

// ==================== Account Operations ====================

impl Database {
    async fn find_account_where(
        &self,
        predicate: &str,
        value: &str,
    ) -> Result<Option<Account>, ServiceError> {
        let sql = format!("SELECT {} FROM accounts WHERE {}", ACCOUNT_COLUMNS, predicate);
        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }
}

#[async_trait]
impl AccountStore for Database {
    async fn create(&self, account: &Account) -> Result<(), ServiceError> {
        let (token, expiry) = match &account.verification {
            Some(v) => (Some(v.token.as_str()), Some(v.expiry_utc)),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, email, password_hash, first_name, last_name,
                avatar_url, is_verified, verification_token, verification_expiry_utc,
                session_marker, external_id, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(account.account_id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.profile.first_name)
        .bind(&account.profile.last_name)
        .bind(&account.profile.avatar_url)
        .bind(account.is_verified)
        .bind(token)
        .bind(expiry)
        .bind(&account.session_marker)
        .bind(&account.external_id)
        .bind(account.created_utc)
        .bind(account.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::conflict("Email already registered")
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn swap_password_hash(
        &self,
        account_id: Uuid,
        expected: &str,
        new: &str,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET password_hash = $1, session_marker = NULL, updated_utc = NOW()
            WHERE account_id = $2 AND password_hash = $3
            "#,
        )
        .bind(new)
        .bind(account_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace_verification(
        &self,
        account_id: Uuid,
        verification: &PendingVerification,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET verification_token = $1, verification_expiry_utc = $2, updated_utc = NOW()
            WHERE account_id = $3 AND NOT is_verified
            "#,
        )
        .bind(&verification.token)
        .bind(verification.expiry_utc)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_verified(
        &self,
        account_id: Uuid,
        token: &str,
    ) -> Result<Option<Account>, ServiceError> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET is_verified = TRUE, verification_token = NULL,
                verification_expiry_utc = NULL, updated_utc = NOW()
            WHERE account_id = $1 AND verification_token = $2
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(account_id)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn link_external_identity(
        &self,
        account_id: Uuid,
        external_id: &str,
        avatar_url: Option<&str>,
    ) -> Result<Account, ServiceError> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET external_id = $2, is_verified = TRUE, verification_token = NULL,
                verification_expiry_utc = NULL, avatar_url = COALESCE(avatar_url, $3),
                updated_utc = NOW()
            WHERE account_id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(account_id)
            .bind(external_id)
            .bind(avatar_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ServiceError::conflict("Account identity already in use")
                } else {
                    e.into()
                }
            })?
            .ok_or_else(|| ServiceError::not_found("Account not found"))?;

        Account::try_from(row)
    }

    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, ServiceError> {
        let sql = format!("SELECT {} FROM accounts WHERE account_id = $1", ACCOUNT_COLUMNS);
        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, ServiceError> {
        self.find_account_where("LOWER(email) = LOWER($1)", email)
            .await
    }

    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Account>, ServiceError> {
        self.find_account_where("verification_token = $1", token)
            .await
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Account>, ServiceError> {
        self.find_account_where("external_id = $1", external_id)
            .await
    }

    async fn set_session_marker(
        &self,
        account_id: Uuid,
        marker: Option<&str>,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query("UPDATE accounts SET session_marker = $1 WHERE account_id = $2")
            .bind(marker)
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Account not found"));
        }
        Ok(())
    }

    async fn swap_session_marker(
        &self,
        account_id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, ServiceError> {
        // Single statement; the row lock serializes racing swaps.
        let result = sqlx::query(
            r#"
            UPDATE accounts SET session_marker = $1
            WHERE account_id = $2 AND session_marker IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(new)
        .bind(account_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.ping().await
    }
}

// ==================== Membership Operations ====================

#[async_trait]
impl MembershipStore for Database {
    async fn create_organization(
        &self,
        organization: &Organization,
        owner: &OrganizationMember,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO organizations (organization_id, name, description, created_by, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(organization.organization_id)
        .bind(&organization.name)
        .bind(&organization.description)
        .bind(organization.created_by)
        .bind(organization.created_utc)
        .bind(organization.updated_utc)
        .execute(&mut *tx)
        .await?;

        insert_member(&mut tx, owner).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Organization>, ServiceError> {
        Ok(sqlx::query_as::<_, OrganizationRow>(
            "SELECT organization_id, name, description, created_by, created_utc, updated_utc \
             FROM organizations WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Organization::from))
    }

    async fn update_organization(&self, organization: &Organization) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE organizations SET name = $2, description = $3, updated_utc = $4 \
             WHERE organization_id = $1",
        )
        .bind(organization.organization_id)
        .bind(&organization.name)
        .bind(&organization.description)
        .bind(organization.updated_utc)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Organization not found"));
        }
        Ok(())
    }

    async fn delete_organization(&self, organization_id: Uuid) -> Result<(), ServiceError> {
        // members, invitations, teams and team_members cascade
        let result = sqlx::query("DELETE FROM organizations WHERE organization_id = $1")
            .bind(organization_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Organization not found"));
        }
        Ok(())
    }

    async fn list_organizations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Organization>, ServiceError> {
        let rows = sqlx::query_as::<_, OrganizationRow>(
            r#"
            SELECT o.organization_id, o.name, o.description, o.created_by, o.created_utc, o.updated_utc
            FROM organizations o
            JOIN organization_members m ON m.organization_id = o.organization_id
            WHERE m.user_id = $1 AND m.status_code = 'ACTIVE'
            ORDER BY o.created_utc
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Organization::from).collect())
    }

    async fn find_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrganizationMember>, ServiceError> {
        sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM organization_members WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(OrganizationMember::try_from)
        .transpose()
    }

    async fn list_members(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, ServiceError> {
        let rows = sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM organization_members WHERE organization_id = $1 ORDER BY joined_utc",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        map_members(rows)
    }

    async fn update_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE organization_members SET role_code = $3, updated_utc = $4 \
             WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::forbidden("Organization already has an owner")
            } else {
                e.into()
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Member not found"));
        }
        Ok(())
    }

    async fn update_member_status(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        status: MemberStatus,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE organization_members SET status_code = $3, updated_utc = $4 \
             WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Member not found"));
        }
        Ok(())
    }

    async fn delete_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM team_members
            WHERE user_id = $2
              AND team_id IN (SELECT team_id FROM teams WHERE organization_id = $1)
            "#,
        )
        .bind(organization_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "DELETE FROM organization_members WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Member not found"));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_invitation(&self, invitation: &Invitation) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO invitations (invitation_id, organization_id, inviter_id, email, role_code,
                token_hash, expiry_utc, accepted_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(invitation.invitation_id)
        .bind(invitation.organization_id)
        .bind(invitation.inviter_id)
        .bind(&invitation.email)
        .bind(invitation.role.as_str())
        .bind(&invitation.token_hash)
        .bind(invitation.expiry_utc)
        .bind(invitation.accepted_utc)
        .bind(invitation.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::conflict("Invitation token collision")
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, ServiceError> {
        sqlx::query_as::<_, InvitationRow>("SELECT * FROM invitations WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(Invitation::try_from)
            .transpose()
    }

    async fn list_invitations(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<Invitation>, ServiceError> {
        sqlx::query_as::<_, InvitationRow>(
            "SELECT * FROM invitations WHERE organization_id = $1 ORDER BY created_utc",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Invitation::try_from)
        .collect()
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        member: &OrganizationMember,
    ) -> Result<OrganizationMember, ServiceError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let claimed = sqlx::query(
            "UPDATE invitations SET accepted_utc = $2 \
             WHERE invitation_id = $1 AND accepted_utc IS NULL",
        )
        .bind(invitation_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            let exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT invitation_id FROM invitations WHERE invitation_id = $1")
                    .bind(invitation_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match exists {
                Some(_) => ServiceError::conflict("Invitation already accepted"),
                None => ServiceError::not_found("Invitation not found"),
            });
        }

        let existing = sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM organization_members \
             WHERE organization_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(member.organization_id)
        .bind(member.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(OrganizationMember::try_from)
        .transpose()?;

        let stored = match existing {
            Some(existing) if existing.status != MemberStatus::Left => {
                return Err(ServiceError::conflict(
                    "User is already a member of this organization",
                ));
            }
            Some(_) => {
                let row = sqlx::query_as::<_, MemberRow>(
                    r#"
                    UPDATE organization_members
                    SET role_code = $3, status_code = 'ACTIVE', updated_utc = $4
                    WHERE organization_id = $1 AND user_id = $2
                    RETURNING *
                    "#,
                )
                .bind(member.organization_id)
                .bind(member.user_id)
                .bind(member.role.as_str())
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                OrganizationMember::try_from(row)?
            }
            None => {
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO organization_members (organization_id, user_id, role_code, status_code, joined_utc, updated_utc)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (organization_id, user_id) DO NOTHING
                    "#,
                )
                .bind(member.organization_id)
                .bind(member.user_id)
                .bind(member.role.as_str())
                .bind(member.status.as_str())
                .bind(member.joined_utc)
                .bind(member.updated_utc)
                .execute(&mut *tx)
                .await?;

                // a concurrent acceptance inserted the row first
                if inserted.rows_affected() == 0 {
                    return Err(ServiceError::conflict(
                        "User is already a member of this organization",
                    ));
                }
                member.clone()
            }
        };

        tx.commit().await?;
        Ok(stored)
    }

    async fn create_team(&self, team: &Team) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO teams (team_id, organization_id, leader_id, name, description, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(team.team_id)
        .bind(team.organization_id)
        .bind(team.leader_id)
        .bind(&team.name)
        .bind(&team.description)
        .bind(team.created_utc)
        .bind(team.updated_utc)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO team_members (team_id, user_id, joined_utc) VALUES ($1, $2, $3)")
            .bind(team.team_id)
            .bind(team.leader_id)
            .bind(team.created_utc)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_team(&self, team_id: Uuid) -> Result<Option<Team>, ServiceError> {
        Ok(
            sqlx::query_as::<_, TeamRow>("SELECT * FROM teams WHERE team_id = $1")
                .bind(team_id)
                .fetch_optional(&self.pool)
                .await?
                .map(Team::from),
        )
    }

    async fn update_team(&self, team: &Team) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE teams SET name = $2, description = $3, updated_utc = $4 WHERE team_id = $1",
        )
        .bind(team.team_id)
        .bind(&team.name)
        .bind(&team.description)
        .bind(team.updated_utc)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Team not found"));
        }
        Ok(())
    }

    async fn change_team_leader(
        &self,
        team_id: Uuid,
        new_leader_id: Uuid,
    ) -> Result<Team, ServiceError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let row = sqlx::query_as::<_, TeamRow>(
            "UPDATE teams SET leader_id = $2, updated_utc = $3 WHERE team_id = $1 RETURNING *",
        )
        .bind(team_id)
        .bind(new_leader_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::not_found("Team not found"))?;

        sqlx::query(
            "INSERT INTO team_members (team_id, user_id, joined_utc) VALUES ($1, $2, $3) \
             ON CONFLICT (team_id, user_id) DO NOTHING",
        )
        .bind(team_id)
        .bind(new_leader_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Team::from(row))
    }

    async fn delete_team(&self, team_id: Uuid) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM teams WHERE team_id = $1")
            .bind(team_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Team not found"));
        }
        Ok(())
    }

    async fn list_teams(&self, organization_id: Uuid) -> Result<Vec<Team>, ServiceError> {
        let rows = sqlx::query_as::<_, TeamRow>(
            "SELECT * FROM teams WHERE organization_id = $1 ORDER BY created_utc",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Team::from).collect())
    }

    async fn teams_led_by(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Team>, ServiceError> {
        let rows = sqlx::query_as::<_, TeamRow>(
            "SELECT * FROM teams WHERE organization_id = $1 AND leader_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Team::from).collect())
    }

    async fn find_team_member(
        &self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, ServiceError> {
        Ok(sqlx::query_as::<_, TeamMemberRow>(
            "SELECT * FROM team_members WHERE team_id = $1 AND user_id = $2",
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(TeamMember::from))
    }

    async fn add_team_member(&self, member: &TeamMember) -> Result<(), ServiceError> {
        sqlx::query("INSERT INTO team_members (team_id, user_id, joined_utc) VALUES ($1, $2, $3)")
            .bind(member.team_id)
            .bind(member.user_id)
            .bind(member.joined_utc)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ServiceError::conflict("User is already a team member")
                } else {
                    e.into()
                }
            })?;
        Ok(())
    }

    async fn remove_team_member(&self, team_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Team member not found"));
        }
        Ok(())
    }

    async fn list_team_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>, ServiceError> {
        let rows = sqlx::query_as::<_, TeamMemberRow>(
            "SELECT * FROM team_members WHERE team_id = $1 ORDER BY joined_utc",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TeamMember::from).collect())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.ping().await
    }
}

async fn insert_member(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    member: &OrganizationMember,
) -> Result<(), ServiceError> {
    sqlx::query(
        r#"
        INSERT INTO organization_members (organization_id, user_id, role_code, status_code, joined_utc, updated_utc)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(member.organization_id)
    .bind(member.user_id)
    .bind(member.role.as_str())
    .bind(member.status.as_str())
    .bind(member.joined_utc)
    .bind(member.updated_utc)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
