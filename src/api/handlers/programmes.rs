use crate::{
    auth::guard::{own_department, require_own_department},
    db::NewProgramme,
    types::{
        parse_update, required_field, ApiJson, AppError, MessageResponse, Principal, Programme,
        ProgrammeChanges, Result,
    },
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateProgrammeRequest {
    #[serde(default)]
    pub programme_name: String,
    pub degree_level_id: Option<i64>,
    pub minimum_duration_years: Option<i64>,
    pub maximum_duration_years: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UpdateProgrammeRequest {
    programme_name: Option<String>,
    degree_level_id: Option<i64>,
    minimum_duration_years: Option<i64>,
    maximum_duration_years: Option<i64>,
    is_active: Option<bool>,
}

async fn load_scoped(state: &AppState, principal: &Principal, id: i64) -> Result<Programme> {
    let programme = state
        .db
        .get_programme(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Programme not found".to_string()))?;
    require_own_department(principal, programme.department_id)?;
    Ok(programme)
}

pub async fn list_programmes(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Programme>>> {
    let department_id = own_department(&principal)?;
    Ok(Json(state.db.list_programmes(department_id).await?))
}

pub async fn get_programme(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Json<Programme>> {
    Ok(Json(load_scoped(&state, &principal, id).await?))
}

pub async fn create_programme(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(payload): ApiJson<CreateProgrammeRequest>,
) -> Result<(StatusCode, Json<Programme>)> {
    let department_id = own_department(&principal)?;
    let new = NewProgramme {
        programme_name: required_field("programme_name", &payload.programme_name)?,
        degree_level_id: payload.degree_level_id.ok_or_else(|| {
            AppError::Validation("Field 'degree_level_id' is required".to_string())
        })?,
        minimum_duration_years: payload.minimum_duration_years.ok_or_else(|| {
            AppError::Validation("Field 'minimum_duration_years' is required".to_string())
        })?,
        maximum_duration_years: payload.maximum_duration_years,
        department_id,
    };

    let programme = state.db.create_programme(new).await?;
    tracing::info!(programme_id = programme.programme_id, department_id, "programme created");

    Ok((StatusCode::CREATED, Json(programme)))
}

/// Setting `is_active` to false also deactivates every enrolled student.
pub async fn update_programme(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Json<Programme>> {
    let request: UpdateProgrammeRequest = parse_update(
        body,
        &[
            "programme_name",
            "degree_level_id",
            "minimum_duration_years",
            "maximum_duration_years",
            "is_active",
        ],
    )?;
    load_scoped(&state, &principal, id).await?;

    let changes = ProgrammeChanges {
        programme_name: request
            .programme_name
            .map(|name| required_field("programme_name", &name))
            .transpose()?,
        degree_level_id: request.degree_level_id,
        minimum_duration_years: request.minimum_duration_years,
        maximum_duration_years: request.maximum_duration_years,
        is_active: request.is_active,
    };

    Ok(Json(state.db.update_programme(id, changes).await?))
}

pub async fn delete_programme(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    load_scoped(&state, &principal, id).await?;
    state.db.delete_programme(id).await?;
    tracing::info!(programme_id = id, "programme deleted");

    Ok(Json(MessageResponse::new("Programme deleted")))
}
