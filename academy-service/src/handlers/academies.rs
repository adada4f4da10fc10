use crate::dtos::{normalize_currency, CreateAcademyRequest, ListResponse, UpdateAcademyRequest};
use crate::middleware::{AcademyContext, UserContext};
use crate::models::{slugify, Academy, PlanResource};
use crate::services::plan_limits::ensure_capacity;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

const DEFAULT_CURRENCY: &str = "EUR";

fn checked_slug(raw: &str) -> Result<String, AppError> {
    let slug = slugify(raw);
    if slug.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "slug must contain at least one letter or digit"
        )));
    }
    Ok(slug)
}

pub async fn create_academy(
    State(state): State<AppState>,
    user: UserContext,
    Json(req): Json<CreateAcademyRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let now = Utc::now();

    ensure_capacity(state.store.as_ref(), user.user_id, PlanResource::Academies, now).await?;

    let slug = checked_slug(req.slug.as_deref().unwrap_or(&req.name))?;
    let currency = match req.currency.as_deref() {
        Some(raw) => normalize_currency(raw)?,
        None => DEFAULT_CURRENCY.to_string(),
    };

    let academy = Academy {
        academy_id: Uuid::new_v4(),
        owner_id: user.user_id,
        name: req.name.trim().to_string(),
        slug,
        city: req.city,
        country: req.country,
        description: req.description,
        contact_email: req.contact_email,
        currency,
        is_public: req.is_public,
        created_utc: now,
        updated_utc: now,
    };

    let academy = state.store.insert_academy(&academy).await?;
    tracing::info!(academy_id = %academy.academy_id, slug = %academy.slug, "Academy created");

    Ok((StatusCode::CREATED, Json(academy)))
}

pub async fn list_academies(
    State(state): State<AppState>,
    user: UserContext,
) -> Result<impl IntoResponse, AppError> {
    let academies = state.store.list_owned_academies(user.user_id).await?;
    Ok(Json(ListResponse::all(academies)))
}

pub async fn get_current_academy(ctx: AcademyContext) -> Json<Academy> {
    Json(ctx.academy)
}

pub async fn update_current_academy(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Json(req): Json<UpdateAcademyRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let mut academy = ctx.academy;

    if let Some(name) = req.name {
        academy.name = name.trim().to_string();
    }
    if let Some(slug) = req.slug {
        academy.slug = checked_slug(&slug)?;
    }
    if let Some(currency) = req.currency {
        academy.currency = normalize_currency(&currency)?;
    }
    if req.city.is_some() {
        academy.city = req.city;
    }
    if req.country.is_some() {
        academy.country = req.country;
    }
    if req.description.is_some() {
        academy.description = req.description;
    }
    if req.contact_email.is_some() {
        academy.contact_email = req.contact_email;
    }
    if let Some(is_public) = req.is_public {
        academy.is_public = is_public;
    }
    academy.updated_utc = Utc::now();

    Ok(Json(state.store.update_academy(&academy).await?))
}
