use crate::services::metrics::record_webhook_event;
use crate::services::payments::webhook::{
    apply_event, verify_signature, WebhookEvent, SIGNATURE_HEADER,
};
use crate::startup::AppState;
use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::json;
use service_core::error::AppError;

/// Payment processor callbacks. The raw body is needed for the signature.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing {} header", SIGNATURE_HEADER))
        })?;

    if let Err(e) = verify_signature(
        signature,
        &body,
        state.config.payments.webhook_secret.expose_secret(),
        Utc::now().timestamp(),
    ) {
        tracing::warn!(error = %e, "Rejected webhook signature");
        record_webhook_event("unknown", "rejected");
        return Err(e.into());
    }

    let event: WebhookEvent = serde_json::from_str(&body).map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Malformed webhook payload: {}", e))
    })?;

    let outcome = match apply_event(state.store.as_ref(), &event, Utc::now()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            record_webhook_event(&event.event_type, "error");
            return Err(e);
        }
    };
    record_webhook_event(&event.event_type, outcome.as_str());

    Ok(Json(json!({
        "received": true,
        "event_id": event.id,
        "outcome": outcome.as_str(),
    })))
}
