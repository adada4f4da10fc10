use crate::dtos::{
    normalize_currency, CreateBillingItemRequest, IncludeInactiveParams, ListResponse,
    UpdateBillingItemRequest,
};
use crate::middleware::AcademyContext;
use crate::models::{BillingItem, Periodicity};
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

pub(crate) async fn load_billing_item(
    state: &AppState,
    academy_id: Uuid,
    billing_item_id: Uuid,
) -> Result<BillingItem, AppError> {
    state
        .store
        .get_billing_item(academy_id, billing_item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Billing item not found")))
}

pub async fn list_billing_items(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Query(params): Query<IncludeInactiveParams>,
) -> Result<impl IntoResponse, AppError> {
    let items = state
        .store
        .list_billing_items(ctx.academy_id(), params.include_inactive)
        .await?;
    Ok(Json(ListResponse::all(items)))
}

pub async fn create_billing_item(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Json(req): Json<CreateBillingItemRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let now = Utc::now();

    let currency = match req.currency.as_deref() {
        Some(raw) => normalize_currency(raw)?,
        None => ctx.academy.currency.clone(),
    };

    let item = BillingItem {
        billing_item_id: Uuid::new_v4(),
        academy_id: ctx.academy_id(),
        name: req.name.trim().to_string(),
        description: req.description,
        amount_cents: req.amount_cents,
        currency,
        periodicity: req
            .periodicity
            .unwrap_or(Periodicity::Monthly)
            .as_str()
            .to_string(),
        is_active: true,
        created_utc: now,
        updated_utc: now,
    };

    let item = state.store.insert_billing_item(&item).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_billing_item(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(billing_item_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        load_billing_item(&state, ctx.academy_id(), billing_item_id).await?,
    ))
}

pub async fn update_billing_item(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(billing_item_id): Path<Uuid>,
    Json(req): Json<UpdateBillingItemRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let mut item = load_billing_item(&state, ctx.academy_id(), billing_item_id).await?;

    if let Some(currency) = req.currency {
        item.currency = normalize_currency(&currency)?;
    }
    if let Some(name) = req.name {
        item.name = name.trim().to_string();
    }
    if req.description.is_some() {
        item.description = req.description;
    }
    if let Some(amount_cents) = req.amount_cents {
        item.amount_cents = amount_cents;
    }
    if let Some(periodicity) = req.periodicity {
        item.periodicity = periodicity.as_str().to_string();
    }
    if let Some(is_active) = req.is_active {
        item.is_active = is_active;
    }
    item.updated_utc = Utc::now();

    Ok(Json(state.store.update_billing_item(&item).await?))
}

/// Hard delete; refused with 409 while charges reference the item.
pub async fn delete_billing_item(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(billing_item_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state
        .store
        .delete_billing_item(ctx.academy_id(), billing_item_id)
        .await?
    {
        return Err(AppError::NotFound(anyhow::anyhow!("Billing item not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
