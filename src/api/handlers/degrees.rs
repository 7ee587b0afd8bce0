//! Degree level administration (ADMIN only).

use crate::{
    types::{parse_update, required_field, ApiJson, AppError, DegreeLevel, MessageResponse, Result},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DegreeRequest {
    #[serde(default)]
    pub level_name: String,
}

pub async fn list_degrees(State(state): State<AppState>) -> Result<Json<Vec<DegreeLevel>>> {
    Ok(Json(state.db.list_degrees().await?))
}

pub async fn create_degree(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<DegreeRequest>,
) -> Result<(StatusCode, Json<DegreeLevel>)> {
    let level_name = required_field("level_name", &payload.level_name)?;
    let degree = state.db.create_degree(&level_name).await?;

    Ok((StatusCode::CREATED, Json(degree)))
}

pub async fn get_degree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DegreeLevel>> {
    state
        .db
        .get_degree(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Degree level not found".to_string()))
}

pub async fn update_degree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Json<DegreeLevel>> {
    let request: DegreeRequest = parse_update(body, &["level_name"])?;
    let level_name = required_field("level_name", &request.level_name)?;

    Ok(Json(state.db.update_degree(id, &level_name).await?))
}

pub async fn delete_degree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    state.db.delete_degree(id).await?;
    Ok(Json(MessageResponse::new("Degree level deleted")))
}
