//! Team endpoints, nested under their organization.

use service_core::{
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::team::{AddTeamMemberRequest, ChangeTeamLeaderRequest, CreateTeamRequest, UpdateTeamRequest},
    middleware::AuthUser,
    models::Team,
    utils::ValidatedJson,
    AppState,
};

/// Resolve a team and make sure it belongs to the organization in the path.
async fn team_in_org(
    state: &AppState,
    actor_id: Uuid,
    org_id: Uuid,
    team_id: Uuid,
) -> Result<Team, AppError> {
    Ok(state.teams.get_team_in_org(actor_id, org_id, team_id).await?)
}

pub async fn create_team(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateTeamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let team = state
        .teams
        .create_team(
            user.account_id(),
            org_id,
            &req.name,
            req.description,
            req.leader_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn list_teams(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let teams = state.teams.list_teams(user.account_id(), org_id).await?;
    Ok(Json(teams))
}

pub async fn get_team(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, team_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let team = team_in_org(&state, user.account_id(), org_id, team_id).await?;
    Ok(Json(team))
}

pub async fn update_team(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, team_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<UpdateTeamRequest>,
) -> Result<impl IntoResponse, AppError> {
    team_in_org(&state, user.account_id(), org_id, team_id).await?;
    let team = state
        .teams
        .update_team(
            user.account_id(),
            team_id,
            req.name.as_deref(),
            req.description,
        )
        .await?;
    Ok(Json(team))
}

pub async fn delete_team(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, team_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    team_in_org(&state, user.account_id(), org_id, team_id).await?;
    state.teams.delete_team(user.account_id(), team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_team_leader(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, team_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ChangeTeamLeaderRequest>,
) -> Result<impl IntoResponse, AppError> {
    team_in_org(&state, user.account_id(), org_id, team_id).await?;
    let team = state
        .teams
        .change_team_leader(user.account_id(), team_id, req.leader_id)
        .await?;
    Ok(Json(team))
}

pub async fn list_team_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, team_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    team_in_org(&state, user.account_id(), org_id, team_id).await?;
    let members = state
        .teams
        .list_team_members(user.account_id(), team_id)
        .await?;
    Ok(Json(members))
}

pub async fn add_team_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, team_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AddTeamMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    team_in_org(&state, user.account_id(), org_id, team_id).await?;
    let member = state
        .teams
        .add_team_member(user.account_id(), team_id, req.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn remove_team_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, team_id, member_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    team_in_org(&state, user.account_id(), org_id, team_id).await?;
    state
        .teams
        .remove_team_member(user.account_id(), team_id, member_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
