use crate::{
    auth::guard::{own_department, require_own_department},
    db::NewBatch,
    types::{
        parse_update, required_field, ApiJson, AppError, Batch, BatchChanges, MessageResponse,
        Principal, Result, Semester,
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
pub struct CreateBatchRequest {
    pub programme_id: Option<i64>,
    #[serde(default)]
    pub batch_name: String,
    pub start_year: Option<i64>,
    /// SPRING or AUTUMN
    #[serde(default)]
    pub start_semester: String,
}

#[derive(Debug, Deserialize)]
struct UpdateBatchRequest {
    batch_name: Option<String>,
    start_year: Option<i64>,
    start_semester: Option<String>,
    is_active: Option<bool>,
}

fn check_year(year: i64) -> Result<i64> {
    if (1900..=9999).contains(&year) {
        Ok(year)
    } else {
        Err(AppError::Validation("Invalid start year".to_string()))
    }
}

async fn load_scoped(state: &AppState, principal: &Principal, id: i64) -> Result<Batch> {
    let batch = state
        .db
        .get_batch(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch not found".to_string()))?;
    require_own_department(principal, batch.department_id)?;
    Ok(batch)
}

pub async fn list_batches(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Batch>>> {
    let department_id = own_department(&principal)?;
    Ok(Json(state.db.list_batches(department_id).await?))
}

pub async fn get_batch(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Json<Batch>> {
    Ok(Json(load_scoped(&state, &principal, id).await?))
}

/// The batch inherits its department from the programme, which must belong
/// to the caller's department.
pub async fn create_batch(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(payload): ApiJson<CreateBatchRequest>,
) -> Result<(StatusCode, Json<Batch>)> {
    let programme_id = payload
        .programme_id
        .ok_or_else(|| AppError::Validation("Field 'programme_id' is required".to_string()))?;
    let batch_name = required_field("batch_name", &payload.batch_name)?;
    let start_year = check_year(
        payload
            .start_year
            .ok_or_else(|| AppError::Validation("Field 'start_year' is required".to_string()))?,
    )?;
    let start_semester: Semester = payload.start_semester.parse()?;

    let programme = state
        .db
        .get_programme(programme_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Programme not found".to_string()))?;
    require_own_department(&principal, programme.department_id)?;

    let batch = state
        .db
        .create_batch(NewBatch {
            programme_id,
            department_id: programme.department_id,
            batch_name,
            start_year,
            start_semester,
        })
        .await?;
    tracing::info!(batch_id = batch.batch_id, programme_id, "batch created");

    Ok((StatusCode::CREATED, Json(batch)))
}

/// Setting `is_active` to false also deactivates the batch's students.
pub async fn update_batch(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Json<Batch>> {
    let request: UpdateBatchRequest = parse_update(
        body,
        &["batch_name", "start_year", "start_semester", "is_active"],
    )?;
    load_scoped(&state, &principal, id).await?;

    let changes = BatchChanges {
        batch_name: request
            .batch_name
            .map(|name| required_field("batch_name", &name))
            .transpose()?,
        start_year: request.start_year.map(check_year).transpose()?,
        start_semester: request
            .start_semester
            .map(|semester| semester.parse())
            .transpose()?,
        is_active: request.is_active,
    };

    Ok(Json(state.db.update_batch(id, changes).await?))
}

pub async fn delete_batch(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    load_scoped(&state, &principal, id).await?;
    state.db.delete_batch(id).await?;
    tracing::info!(batch_id = id, "batch deleted");

    Ok(Json(MessageResponse::new("Batch deleted")))
}
