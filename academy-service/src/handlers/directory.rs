//! Public academy directory. No identification headers.

use crate::dtos::{DirectoryAcademy, DirectoryParams, ListResponse, Pagination};
use crate::models::DirectoryFilter;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn list_public_academies(
    State(state): State<AppState>,
    Query(params): Query<DirectoryParams>,
) -> Result<impl IntoResponse, AppError> {
    let pagination = Pagination::new(params.page, params.page_size);
    let filter = DirectoryFilter {
        city: non_empty(params.city),
        query: non_empty(params.q),
        limit: pagination.limit(),
        offset: pagination.offset(),
    };

    let (academies, total) = state.store.list_public_academies(&filter).await?;
    let items = academies.into_iter().map(DirectoryAcademy::from).collect();

    Ok(Json(ListResponse::new(items, total, pagination)))
}

pub async fn get_public_academy(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let academy = state
        .store
        .get_academy_by_slug(&slug)
        .await?
        .filter(|a| a.is_public)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Academy not found")))?;

    Ok(Json(DirectoryAcademy::from(academy)))
}
