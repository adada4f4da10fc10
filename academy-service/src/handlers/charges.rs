use crate::dtos::{
    normalize_currency, ChargeListParams, CreateChargeRequest, GenerateChargesRequest,
    ListResponse, Pagination, PayChargeRequest, UpdateChargeRequest,
};
use crate::handlers::athletes::load_athlete;
use crate::handlers::billing_items::load_billing_item;
use crate::handlers::groups::load_group;
use crate::middleware::AcademyContext;
use crate::models::{
    BillingPeriod, Charge, ChargeOrigin, ChargeStatus, ListChargesFilter, StatusChange,
};
use crate::services::charge_generator::{generate_charges as run_generation, GenerateCharges};
use crate::services::charges::transition_charge;
use crate::services::payments::{CheckoutItem, CheckoutMode, CheckoutRequest};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

fn parse_period(raw: &str) -> Result<BillingPeriod, AppError> {
    raw.parse()
        .map_err(|e| AppError::BadRequest(anyhow::Error::new(e)))
}

async fn load_charge(
    state: &AppState,
    academy_id: Uuid,
    charge_id: Uuid,
) -> Result<Charge, AppError> {
    state
        .store
        .get_charge(academy_id, charge_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Charge not found")))
}

pub async fn list_charges(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Query(params): Query<ChargeListParams>,
) -> Result<impl IntoResponse, AppError> {
    let pagination = Pagination::new(params.page, params.page_size);
    let period = match params.period.as_deref().filter(|p| !p.is_empty()) {
        Some(raw) => Some(parse_period(raw)?.to_string()),
        None => None,
    };

    let filter = ListChargesFilter {
        period,
        status: params.status,
        athlete_id: params.athlete_id,
        group_id: params.group_id,
        limit: pagination.limit(),
        offset: pagination.offset(),
    };

    let (charges, total) = state.store.list_charges(ctx.academy_id(), &filter).await?;
    Ok(Json(ListResponse::new(charges, total, pagination)))
}

/// Manual charge, outside the monthly generation.
pub async fn create_charge(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Json(req): Json<CreateChargeRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let academy_id = ctx.academy_id();

    load_athlete(&state, academy_id, req.athlete_id).await?;
    if let Some(group_id) = req.group_id {
        load_group(&state, academy_id, group_id).await?;
    }
    let item = match req.billing_item_id {
        Some(item_id) => Some(load_billing_item(&state, academy_id, item_id).await?),
        None => None,
    };

    let amount_cents = req
        .amount_cents
        .or_else(|| item.as_ref().map(|i| i.amount_cents))
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "amount_cents is required when no billing item is given"
            ))
        })?;
    if amount_cents <= 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Charge amount must be positive"
        )));
    }

    let currency = match (req.currency.as_deref(), item.as_ref()) {
        (Some(raw), _) => normalize_currency(raw)?,
        (None, Some(item)) => item.currency.clone(),
        (None, None) => ctx.academy.currency.clone(),
    };

    let period = match req.period.as_deref() {
        Some(raw) => parse_period(raw)?,
        None => BillingPeriod::containing(req.due_date),
    };

    let description = req
        .description
        .filter(|d| !d.trim().is_empty())
        .or_else(|| item.as_ref().map(|i| i.name.clone()))
        .unwrap_or_else(|| format!("Charge – {}", period.label()));

    let now = Utc::now();
    let charge = Charge {
        charge_id: Uuid::new_v4(),
        academy_id,
        athlete_id: req.athlete_id,
        group_id: req.group_id,
        billing_item_id: req.billing_item_id,
        period: period.to_string(),
        description,
        amount_cents,
        amount_paid_cents: 0,
        currency,
        due_date: req.due_date,
        status: ChargeStatus::Pending.as_str().to_string(),
        payment_method: None,
        paid_utc: None,
        origin: ChargeOrigin::Manual.as_str().to_string(),
        notes: req.notes,
        processor_session_id: None,
        created_utc: now,
        updated_utc: now,
    };

    let charge = state.store.insert_charge(&charge).await?;
    Ok((StatusCode::CREATED, Json(charge)))
}

pub async fn get_charge(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(charge_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(load_charge(&state, ctx.academy_id(), charge_id).await?))
}

/// Edit a charge and, with `status`, move it through the state machine.
pub async fn update_charge(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(charge_id): Path<Uuid>,
    Json(req): Json<UpdateChargeRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let now = Utc::now();
    let mut charge = load_charge(&state, ctx.academy_id(), charge_id).await?;
    let current = charge.status()?;

    if req.amount_cents.is_some() || req.due_date.is_some() {
        if !current.is_open() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Amount and due date can only change while the charge is open, it is {}",
                current
            )));
        }
        if let Some(amount_cents) = req.amount_cents {
            if amount_cents <= charge.amount_paid_cents {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Amount must exceed the {} already paid",
                    charge.amount_paid_cents
                )));
            }
            charge.amount_cents = amount_cents;
        }
        if let Some(due_date) = req.due_date {
            charge.due_date = due_date;
        }
    }
    if let Some(description) = req.description {
        charge.description = description;
    }
    if req.notes.is_some() {
        charge.notes = req.notes;
    }

    let Some(status) = req.status else {
        if req.amount_paid_cents.is_some() || req.payment_method.is_some() || req.paid_at.is_some()
        {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "status is required when changing payment fields"
            )));
        }
        charge.updated_utc = now;
        return Ok(Json(state.store.update_charge(&charge).await?));
    };

    let change = StatusChange {
        status,
        amount_paid_cents: req.amount_paid_cents,
        payment_method: req.payment_method,
        paid_utc: req.paid_at,
    };
    let charge = transition_charge(state.store.as_ref(), charge, change, "staff", now).await?;
    Ok(Json(charge))
}

/// Only pending or cancelled charges may be removed.
pub async fn delete_charge(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(charge_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let charge = load_charge(&state, ctx.academy_id(), charge_id).await?;
    let status = charge.status()?;

    if !matches!(status, ChargeStatus::Pending | ChargeStatus::Cancelled) {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Only pending or cancelled charges can be deleted, this one is {}",
            status
        )));
    }

    state.store.delete_charge(ctx.academy_id(), charge_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn generate_charges(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Json(req): Json<GenerateChargesRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let request = GenerateCharges {
        academy_id: ctx.academy_id(),
        group_id: req.group_id,
        period: parse_period(&req.period)?,
        skip_duplicates: req.skip_duplicates,
        due_day: req
            .due_day
            .unwrap_or(state.config.billing.default_due_day),
        fallback_billing_item_id: req.billing_item_id,
    };

    let summary = run_generation(state.store.as_ref(), &request, Utc::now()).await?;
    Ok(Json(summary))
}

pub async fn pay_charge(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(charge_id): Path<Uuid>,
    Json(req): Json<PayChargeRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let charge = load_charge(&state, ctx.academy_id(), charge_id).await?;

    let charge = transition_charge(
        state.store.as_ref(),
        charge,
        StatusChange::paid(req.payment_method.trim(), req.paid_at),
        "staff",
        Utc::now(),
    )
    .await?;
    Ok(Json(charge))
}

/// Hosted checkout for the outstanding balance of one charge.
pub async fn checkout_charge(
    State(state): State<AppState>,
    ctx: AcademyContext,
    Path(charge_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut charge = load_charge(&state, ctx.academy_id(), charge_id).await?;
    let status = charge.status()?;

    if !status.is_open() || charge.balance_cents() == 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Charge is {} and has nothing left to pay",
            status
        )));
    }

    let customer_email = state
        .store
        .list_athlete_guardians(charge.athlete_id)
        .await?
        .into_iter()
        .find_map(|g| g.email.filter(|e| !e.is_empty()));

    let base = state.config.app_base_url.trim_end_matches('/');
    let mut metadata = BTreeMap::new();
    metadata.insert("charge_id".to_string(), charge.charge_id.to_string());
    metadata.insert("academy_id".to_string(), charge.academy_id.to_string());

    let request = CheckoutRequest {
        mode: CheckoutMode::Payment,
        item: CheckoutItem::Amount {
            amount_cents: charge.balance_cents(),
            currency: charge.currency.clone(),
            name: charge.description.clone(),
        },
        customer_id: None,
        customer_email,
        success_url: format!("{}/billing/charges/{}?checkout=success", base, charge_id),
        cancel_url: format!("{}/billing/charges/{}?checkout=cancelled", base, charge_id),
        metadata,
    };

    let session = state.processor.create_checkout_session(&request).await?;
    tracing::info!(
        charge_id = %charge_id,
        session_id = %session.session_id,
        processor = state.processor.name(),
        "Charge checkout session created"
    );

    charge.processor_session_id = Some(session.session_id.clone());
    charge.updated_utc = Utc::now();
    state.store.update_charge(&charge).await?;

    Ok(Json(session))
}
