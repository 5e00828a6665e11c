//! Organization, member and invitation endpoints.

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
    dtos::org::{
        AcceptInvitationRequest, CreateOrganizationRequest, InvitationCreatedResponse,
        InviteMemberRequest, UpdateMemberRoleRequest, UpdateOrganizationRequest,
    },
    middleware::AuthUser,
    models::InvitationResponse,
    utils::ValidatedJson,
    AppState,
};

pub async fn create_organization(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let org = state
        .organizations
        .create_organization(user.account_id(), &req.name, req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(org)))
}

/// Organizations the caller is an active member of
pub async fn list_organizations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let orgs = state
        .organizations
        .list_organizations(user.account_id())
        .await?;
    Ok(Json(orgs))
}

pub async fn get_organization(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let org = state
        .organizations
        .get_organization(user.account_id(), org_id)
        .await?;
    Ok(Json(org))
}

pub async fn update_organization(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let org = state
        .organizations
        .update_organization(
            user.account_id(),
            org_id,
            req.name.as_deref(),
            req.description,
        )
        .await?;
    Ok(Json(org))
}

pub async fn delete_organization(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .organizations
        .delete_organization(user.account_id(), org_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave_organization(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .organizations
        .leave_organization(user.account_id(), org_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ===== Members =====

pub async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let members = state
        .organizations
        .list_members(user.account_id(), org_id)
        .await?;
    Ok(Json(members))
}

pub async fn update_member_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, member_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateMemberRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let member = state
        .organizations
        .update_member_role(user.account_id(), org_id, member_id, req.role)
        .await?;
    Ok(Json(member))
}

pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    state
        .organizations
        .remove_member(user.account_id(), org_id, member_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ===== Invitations =====

pub async fn invite_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<InviteMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = state
        .organizations
        .invite_member(user.account_id(), org_id, &req.email, req.role)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(InvitationCreatedResponse::from(issued)),
    ))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invitations: Vec<InvitationResponse> = state
        .organizations
        .list_invitations(user.account_id(), org_id)
        .await?
        .into_iter()
        .map(InvitationResponse::from)
        .collect();
    Ok(Json(invitations))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<AcceptInvitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let member = state
        .organizations
        .accept_invitation(user.account_id(), &req.token)
        .await?;
    Ok(Json(member))
}
