use crate::dtos::{
    AthleteListParams, CreateAthleteRequest, LinkGuardianRequest, ListResponse, Pagination,
    UpdateAthleteRequest,
};
use crate::middleware::AcademyContext;
use crate::models::{Athlete, AthleteStatus, ListAthletesFilter, PlanResource};
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

pub(crate) async fn load_athlete(
    state: &AppState,
    academy_id: Uuid,
    athlete_id: Uuid,
) -> Result<Athlete, AppError> {
    state
        .store
        .get_athlete(academy_id, athlete_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Athlete not found")))
}

pub async fn list_athletes(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Query(params): Query<AthleteListParams>,
) -> Result<impl IntoResponse, AppError> {
    let pagination = Pagination::new(params.page, params.page_size);
    let filter = ListAthletesFilter {
        status: params.status,
        query: params.q.filter(|q| !q.trim().is_empty()),
        limit: pagination.limit(),
        offset: pagination.offset(),
    };

    let (athletes, total) = state.store.list_athletes(ctx.academy_id(), &filter).await?;
    Ok(Json(ListResponse::new(athletes, total, pagination)))
}

pub async fn create_athlete(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Json(req): Json<CreateAthleteRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let now = Utc::now();

    ensure_capacity(state.store.as_ref(), ctx.owner_id, PlanResource::Athletes, now).await?;

    let athlete = Athlete {
        athlete_id: Uuid::new_v4(),
        academy_id: ctx.academy_id(),
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        birth_date: req.birth_date,
        level: req.level,
        status: AthleteStatus::Active.as_str().to_string(),
        notes: req.notes,
        created_utc: now,
        updated_utc: now,
    };

    let athlete = state.store.insert_athlete(&athlete).await?;
    Ok((StatusCode::CREATED, Json(athlete)))
}

pub async fn get_athlete(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(athlete_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(load_athlete(&state, ctx.academy_id(), athlete_id).await?))
}

pub async fn update_athlete(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(athlete_id): Path<Uuid>,
    Json(req): Json<UpdateAthleteRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let now = Utc::now();
    let mut athlete = load_athlete(&state, ctx.academy_id(), athlete_id).await?;

    if let Some(status) = req.status {
        if status == AthleteStatus::Active && !athlete.is_active() {
            ensure_capacity(state.store.as_ref(), ctx.owner_id, PlanResource::Athletes, now)
                .await?;
        }
        athlete.status = status.as_str().to_string();
    }
    if let Some(first_name) = req.first_name {
        athlete.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = req.last_name {
        athlete.last_name = last_name.trim().to_string();
    }
    if req.birth_date.is_some() {
        athlete.birth_date = req.birth_date;
    }
    if req.level.is_some() {
        athlete.level = req.level;
    }
    if req.notes.is_some() {
        athlete.notes = req.notes;
    }
    athlete.updated_utc = now;

    Ok(Json(state.store.update_athlete(&athlete).await?))
}

/// Soft delete: the athlete becomes inactive and stops being billed.
pub async fn delete_athlete(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(athlete_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut athlete = load_athlete(&state, ctx.academy_id(), athlete_id).await?;

    if athlete.is_active() {
        athlete.status = AthleteStatus::Inactive.as_str().to_string();
        athlete.updated_utc = Utc::now();
        state.store.update_athlete(&athlete).await?;
        tracing::info!(athlete_id = %athlete_id, "Athlete deactivated");
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_athlete_guardians(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(athlete_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    load_athlete(&state, ctx.academy_id(), athlete_id).await?;
    let guardians = state.store.list_athlete_guardians(athlete_id).await?;
    Ok(Json(ListResponse::all(guardians)))
}

pub async fn link_guardian(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(athlete_id): Path<Uuid>,
    Json(req): Json<LinkGuardianRequest>,
) -> Result<impl IntoResponse, AppError> {
    load_athlete(&state, ctx.academy_id(), athlete_id).await?;
    state
        .store
        .get_guardian(ctx.academy_id(), req.guardian_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Guardian not found")))?;

    state.store.link_guardian(athlete_id, req.guardian_id).await?;

    let guardians = state.store.list_athlete_guardians(athlete_id).await?;
    Ok((StatusCode::CREATED, Json(ListResponse::all(guardians))))
}

pub async fn unlink_guardian(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path((athlete_id, guardian_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    load_athlete(&state, ctx.academy_id(), athlete_id).await?;

    if !state.store.unlink_guardian(athlete_id, guardian_id).await? {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Guardian is not linked to this athlete"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
