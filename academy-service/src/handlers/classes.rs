use crate::dtos::{
    AttendanceParams, CreateClassRequest, IncludeInactiveParams, ListResponse,
    RecordAttendanceRequest, UpdateClassRequest,
};
use crate::handlers::athletes::load_athlete;
use crate::handlers::groups::load_group;
use crate::middleware::AcademyContext;
use crate::models::{AttendanceRecord, Class, PlanResource};
use crate::services::plan_limits::ensure_capacity;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

/// `H:MM` or `HH:MM` normalized to `HH:MM`.
fn parse_start_time(raw: &str) -> Result<String, AppError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| {
            AppError::BadRequest(anyhow::anyhow!(
                "start_time must be HH:MM (24h), got '{}'",
                raw
            ))
        })
}

async fn load_class(state: &AppState, academy_id: Uuid, class_id: Uuid) -> Result<Class, AppError> {
    state
        .store
        .get_class(academy_id, class_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Class not found")))
}

pub async fn list_classes(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Query(params): Query<IncludeInactiveParams>,
) -> Result<impl IntoResponse, AppError> {
    let classes = state
        .store
        .list_classes(ctx.academy_id(), params.include_inactive)
        .await?;
    Ok(Json(ListResponse::all(classes)))
}

pub async fn create_class(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Json(req): Json<CreateClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let now = Utc::now();
    let start_time = parse_start_time(&req.start_time)?;

    ensure_capacity(state.store.as_ref(), ctx.owner_id, PlanResource::Classes, now).await?;
    if let Some(group_id) = req.group_id {
        load_group(&state, ctx.academy_id(), group_id).await?;
    }

    let class = Class {
        class_id: Uuid::new_v4(),
        academy_id: ctx.academy_id(),
        group_id: req.group_id,
        name: req.name.trim().to_string(),
        weekday: req.weekday,
        start_time,
        duration_minutes: req.duration_minutes,
        coach_name: req.coach_name,
        is_active: true,
        created_utc: now,
    };

    let class = state.store.insert_class(&class).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

pub async fn get_class(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(class_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(load_class(&state, ctx.academy_id(), class_id).await?))
}

pub async fn update_class(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(class_id): Path<Uuid>,
    Json(req): Json<UpdateClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let mut class = load_class(&state, ctx.academy_id(), class_id).await?;

    if let Some(is_active) = req.is_active {
        if is_active && !class.is_active {
            ensure_capacity(
                state.store.as_ref(),
                ctx.owner_id,
                PlanResource::Classes,
                Utc::now(),
            )
            .await?;
        }
        class.is_active = is_active;
    }
    if let Some(group_id) = req.group_id {
        load_group(&state, ctx.academy_id(), group_id).await?;
        class.group_id = Some(group_id);
    }
    if let Some(start_time) = req.start_time {
        class.start_time = parse_start_time(&start_time)?;
    }
    if let Some(name) = req.name {
        class.name = name.trim().to_string();
    }
    if let Some(weekday) = req.weekday {
        class.weekday = weekday;
    }
    if let Some(duration_minutes) = req.duration_minutes {
        class.duration_minutes = duration_minutes;
    }
    if req.coach_name.is_some() {
        class.coach_name = req.coach_name;
    }

    Ok(Json(state.store.update_class(&class).await?))
}

/// Soft delete. Attendance history is kept.
pub async fn delete_class(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(class_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut class = load_class(&state, ctx.academy_id(), class_id).await?;

    if class.is_active {
        class.is_active = false;
        state.store.update_class(&class).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_attendance(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(class_id): Path<Uuid>,
    Query(params): Query<AttendanceParams>,
) -> Result<impl IntoResponse, AppError> {
    load_class(&state, ctx.academy_id(), class_id).await?;
    let records = state.store.list_attendance(class_id, params.date).await?;
    Ok(Json(ListResponse::all(records)))
}

pub async fn record_attendance(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(class_id): Path<Uuid>,
    Json(req): Json<RecordAttendanceRequest>,
) -> Result<impl IntoResponse, AppError> {
    load_class(&state, ctx.academy_id(), class_id).await?;
    load_athlete(&state, ctx.academy_id(), req.athlete_id).await?;

    let record = AttendanceRecord {
        attendance_id: Uuid::new_v4(),
        class_id,
        athlete_id: req.athlete_id,
        session_date: req.session_date,
        status: req.status.as_str().to_string(),
        recorded_utc: Utc::now(),
    };

    let record = state.store.upsert_attendance(&record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_time_is_normalized() {
        assert_eq!(parse_start_time("9:05").unwrap(), "09:05");
        assert_eq!(parse_start_time(" 17:30 ").unwrap(), "17:30");
        assert!(parse_start_time("25:00").is_err());
        assert!(parse_start_time("5pm").is_err());
    }
}
