use crate::dtos::{
    CreateGuardianRequest, ListResponse, PageParams, Pagination, UpdateGuardianRequest,
};
use crate::middleware::AcademyContext;
use crate::models::Guardian;
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

async fn load_guardian(
    state: &AppState,
    academy_id: Uuid,
    guardian_id: Uuid,
) -> Result<Guardian, AppError> {
    state
        .store
        .get_guardian(academy_id, guardian_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Guardian not found")))
}

pub async fn list_guardians(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let pagination = Pagination::new(params.page, params.page_size);
    let (guardians, total) = state
        .store
        .list_guardians(ctx.academy_id(), pagination.limit(), pagination.offset())
        .await?;
    Ok(Json(ListResponse::new(guardians, total, pagination)))
}

pub async fn create_guardian(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Json(req): Json<CreateGuardianRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let guardian = Guardian {
        guardian_id: Uuid::new_v4(),
        academy_id: ctx.academy_id(),
        full_name: req.full_name.trim().to_string(),
        email: req.email,
        phone: req.phone,
        relationship: req.relationship,
        created_utc: Utc::now(),
    };

    let guardian = state.store.insert_guardian(&guardian).await?;
    Ok((StatusCode::CREATED, Json(guardian)))
}

pub async fn get_guardian(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(guardian_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(load_guardian(&state, ctx.academy_id(), guardian_id).await?))
}

pub async fn update_guardian(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(guardian_id): Path<Uuid>,
    Json(req): Json<UpdateGuardianRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let mut guardian = load_guardian(&state, ctx.academy_id(), guardian_id).await?;

    if let Some(full_name) = req.full_name {
        guardian.full_name = full_name.trim().to_string();
    }
    if req.email.is_some() {
        guardian.email = req.email;
    }
    if req.phone.is_some() {
        guardian.phone = req.phone;
    }
    if req.relationship.is_some() {
        guardian.relationship = req.relationship;
    }

    Ok(Json(state.store.update_guardian(&guardian).await?))
}

/// Removes the guardian together with its athlete links.
pub async fn delete_guardian(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(guardian_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state
        .store
        .delete_guardian(ctx.academy_id(), guardian_id)
        .await?
    {
        return Err(AppError::NotFound(anyhow::anyhow!("Guardian not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
