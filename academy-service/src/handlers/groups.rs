use crate::dtos::{
    CreateGroupRequest, IncludeInactiveParams, ListResponse, MembershipRequest,
    UpdateGroupRequest, UpdateMembershipRequest,
};
use crate::handlers::athletes::load_athlete;
use crate::middleware::AcademyContext;
use crate::models::{Group, GroupMembership, PlanResource};
use crate::services::plan_limits::ensure_capacity;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

pub(crate) async fn load_group(
    state: &AppState,
    academy_id: Uuid,
    group_id: Uuid,
) -> Result<Group, AppError> {
    state
        .store
        .get_group(academy_id, group_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Group not found")))
}

async fn check_billing_item(
    state: &AppState,
    academy_id: Uuid,
    billing_item_id: Option<Uuid>,
) -> Result<(), AppError> {
    if let Some(item_id) = billing_item_id {
        state
            .store
            .get_billing_item(academy_id, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Billing item not found")))?;
    }
    Ok(())
}

pub async fn list_groups(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Query(params): Query<IncludeInactiveParams>,
) -> Result<impl IntoResponse, AppError> {
    let groups = state
        .store
        .list_groups(ctx.academy_id(), params.include_inactive)
        .await?;
    Ok(Json(ListResponse::all(groups)))
}

pub async fn create_group(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let now = Utc::now();

    ensure_capacity(state.store.as_ref(), ctx.owner_id, PlanResource::Groups, now).await?;
    check_billing_item(&state, ctx.academy_id(), req.billing_item_id).await?;

    let group = Group {
        group_id: Uuid::new_v4(),
        academy_id: ctx.academy_id(),
        name: req.name.trim().to_string(),
        description: req.description,
        monthly_fee_cents: req.monthly_fee_cents,
        billing_item_id: req.billing_item_id,
        is_active: true,
        created_utc: now,
        updated_utc: now,
    };

    let group = state.store.insert_group(&group).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_group(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(load_group(&state, ctx.academy_id(), group_id).await?))
}

pub async fn update_group(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(group_id): Path<Uuid>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let now = Utc::now();
    let mut group = load_group(&state, ctx.academy_id(), group_id).await?;

    if let Some(is_active) = req.is_active {
        if is_active && !group.is_active {
            ensure_capacity(state.store.as_ref(), ctx.owner_id, PlanResource::Groups, now).await?;
        }
        group.is_active = is_active;
    }
    if req.billing_item_id.is_some() {
        check_billing_item(&state, ctx.academy_id(), req.billing_item_id).await?;
        group.billing_item_id = req.billing_item_id;
    }
    if let Some(name) = req.name {
        group.name = name.trim().to_string();
    }
    if req.description.is_some() {
        group.description = req.description;
    }
    if req.monthly_fee_cents.is_some() {
        group.monthly_fee_cents = req.monthly_fee_cents;
    }
    group.updated_utc = now;

    Ok(Json(state.store.update_group(&group).await?))
}

/// Soft delete. Memberships are kept but no longer billed.
pub async fn delete_group(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut group = load_group(&state, ctx.academy_id(), group_id).await?;

    if group.is_active {
        group.is_active = false;
        group.updated_utc = Utc::now();
        state.store.update_group(&group).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    load_group(&state, ctx.academy_id(), group_id).await?;
    let members = state.store.list_memberships(group_id).await?;
    Ok(Json(ListResponse::all(members)))
}

pub async fn add_member(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(group_id): Path<Uuid>,
    Json(req): Json<MembershipRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    load_group(&state, ctx.academy_id(), group_id).await?;
    load_athlete(&state, ctx.academy_id(), req.athlete_id).await?;

    let membership = GroupMembership {
        group_id,
        athlete_id: req.athlete_id,
        custom_fee_cents: req.custom_fee_cents,
        is_active: req.is_active,
        joined_utc: Utc::now(),
    };

    let membership = state.store.upsert_membership(&membership).await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

pub async fn update_member(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path((group_id, athlete_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateMembershipRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    load_group(&state, ctx.academy_id(), group_id).await?;

    let mut membership = state
        .store
        .get_membership(group_id, athlete_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Membership not found")))?;

    if req.clear_custom_fee {
        membership.custom_fee_cents = None;
    } else if req.custom_fee_cents.is_some() {
        membership.custom_fee_cents = req.custom_fee_cents;
    }
    if let Some(is_active) = req.is_active {
        membership.is_active = is_active;
    }

    Ok(Json(state.store.upsert_membership(&membership).await?))
}

pub async fn remove_member(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path((group_id, athlete_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    load_group(&state, ctx.academy_id(), group_id).await?;

    if !state.store.delete_membership(group_id, athlete_id).await? {
        return Err(AppError::NotFound(anyhow::anyhow!("Membership not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
