//! Owner subscription, plan changes, processor billing and notifications.

use crate::dtos::{
    ListResponse, NotificationParams, PlanChangeRequest, PlanChangeResponse, PortalRequest,
    PortalResponse, SubscriptionCheckoutRequest, SubscriptionResponse,
};
use crate::middleware::UserContext;
use crate::models::PlanCode;
use crate::services::payments::{CheckoutItem, CheckoutMode, CheckoutRequest};
use crate::services::plan_limits::{change_plan as apply_plan_change, current_subscription};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use std::collections::BTreeMap;
use uuid::Uuid;

pub async fn get_subscription(
    State(state): State<AppState>,
    user: UserContext,
) -> Result<impl IntoResponse, AppError> {
    let subscription = current_subscription(state.store.as_ref(), user.user_id, Utc::now()).await?;
    let limits = subscription.plan().limits();
    let usage = state.store.usage_for_owner(user.user_id).await?;

    Ok(Json(SubscriptionResponse {
        violations: limits.violations(&usage),
        subscription,
        limits,
        usage,
    }))
}

/// 409 with the violation list when the target plan is too small and
/// `force` is not set.
pub async fn change_plan(
    State(state): State<AppState>,
    user: UserContext,
    Json(req): Json<PlanChangeRequest>,
) -> Result<Response, AppError> {
    let outcome = apply_plan_change(
        state.store.as_ref(),
        user.user_id,
        req.plan_code,
        req.force,
        Utc::now(),
    )
    .await?;

    if !outcome.applied {
        let body = PlanChangeResponse {
            applied: false,
            plan_code: outcome.plan_code,
            violations: outcome.violations,
            forced: None,
        };
        return Ok((StatusCode::CONFLICT, Json(body)).into_response());
    }

    Ok(Json(PlanChangeResponse {
        applied: true,
        plan_code: outcome.plan_code,
        violations: outcome.violations,
        forced: Some(outcome.forced),
    })
    .into_response())
}

pub async fn create_checkout(
    State(state): State<AppState>,
    user: UserContext,
    Json(req): Json<SubscriptionCheckoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.plan_code == PlanCode::Free {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "The free plan needs no checkout"
        )));
    }
    let price_id = state
        .config
        .payments
        .price_id(req.plan_code)
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "No price configured for the {} plan",
                req.plan_code
            ))
        })?
        .to_string();

    let subscription = current_subscription(state.store.as_ref(), user.user_id, Utc::now()).await?;

    let base = state.config.app_base_url.trim_end_matches('/');
    let mut metadata = BTreeMap::new();
    metadata.insert("owner_id".to_string(), user.user_id.to_string());
    metadata.insert("plan_code".to_string(), req.plan_code.as_str().to_string());

    let request = CheckoutRequest {
        mode: CheckoutMode::Subscription,
        item: CheckoutItem::Price { price_id },
        customer_id: subscription.processor_customer_id,
        customer_email: None,
        success_url: format!("{}/settings/billing?checkout=success", base),
        cancel_url: format!("{}/settings/billing?checkout=cancelled", base),
        metadata,
    };

    let session = state.processor.create_checkout_session(&request).await?;
    tracing::info!(
        owner_id = %user.user_id,
        plan_code = %req.plan_code,
        session_id = %session.session_id,
        "Subscription checkout session created"
    );

    Ok(Json(session))
}

pub async fn create_portal(
    State(state): State<AppState>,
    user: UserContext,
    Json(req): Json<PortalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = current_subscription(state.store.as_ref(), user.user_id, Utc::now()).await?;
    let customer_id = subscription.processor_customer_id.ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "No billing account yet; subscribe to a paid plan first"
        ))
    })?;

    let return_url = req.return_url.unwrap_or_else(|| {
        format!(
            "{}/settings/billing",
            state.config.app_base_url.trim_end_matches('/')
        )
    });

    let url = state
        .processor
        .create_portal_session(&customer_id, &return_url)
        .await?;
    Ok(Json(PortalResponse { url }))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    user: UserContext,
) -> Result<impl IntoResponse, AppError> {
    let invoices = state.store.list_processor_invoices(user.user_id).await?;
    Ok(Json(ListResponse::all(invoices)))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    user: UserContext,
    Query(params): Query<NotificationParams>,
) -> Result<impl IntoResponse, AppError> {
    let notifications = state
        .store
        .list_notifications(user.user_id, params.unread_only)
        .await?;
    Ok(Json(ListResponse::all(notifications)))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    user: UserContext,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let notification = state
        .store
        .mark_notification_read(user.user_id, notification_id, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Notification not found")))?;
    Ok(Json(notification))
}
