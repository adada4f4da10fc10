//! Identification extractors.
//!
//! `X-User-ID` and `X-Academy-ID` are set by the BFF after it has
//! authenticated the caller; the service trusts them as given.

use crate::models::Academy;
use crate::startup::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const ACADEMY_ID_HEADER: &str = "X-Academy-ID";

fn uuid_header(parts: &Parts, name: &str) -> Result<Uuid, AppError> {
    let raw = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing {} header", name)))?;

    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid {} header", name)))
}

/// The calling user. Owner of academies and of the subscription.
#[derive(Debug, Clone, Copy)]
pub struct UserContext {
    pub user_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = uuid_header(parts, USER_ID_HEADER)?;

        tracing::Span::current().record("user_id", tracing::field::display(user_id));

        Ok(UserContext { user_id })
    }
}

/// The academy selected by `X-Academy-ID`, verified to belong to the caller.
#[derive(Debug, Clone)]
pub struct AcademyContext {
    pub owner_id: Uuid,
    pub academy: Academy,
}

impl AcademyContext {
    pub fn academy_id(&self) -> Uuid {
        self.academy.academy_id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AcademyContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let UserContext { user_id } = UserContext::from_request_parts(parts, state).await?;
        let academy_id = uuid_header(parts, ACADEMY_ID_HEADER)?;

        let academy = state
            .store
            .get_academy(academy_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Academy not found")))?;

        if academy.owner_id != user_id {
            tracing::warn!(
                academy_id = %academy_id,
                user_id = %user_id,
                "Academy access denied"
            );
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Academy belongs to another owner"
            )));
        }

        tracing::Span::current().record("academy_id", tracing::field::display(academy_id));

        Ok(AcademyContext {
            owner_id: user_id,
            academy,
        })
    }
}
