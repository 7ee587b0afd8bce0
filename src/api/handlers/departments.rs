//! Department administration (ADMIN only).

use crate::{
    db::{DepartmentChanges, HodAssignment},
    types::{
        parse_update, required_field, validated_email, ApiJson, AppError, DepartmentView,
        MessageResponse, Result,
    },
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
pub struct CreateDepartmentRequest {
    #[serde(default)]
    pub department_code: String,
    #[serde(default)]
    pub department_name: String,
    /// Existing account to promote, or the email of a new HOD account
    #[serde(default)]
    pub hod_email: String,
    /// Required when `hod_email` does not belong to an existing account
    pub hod_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateDepartmentRequest {
    department_code: Option<String>,
    department_name: Option<String>,
    hod_email: Option<String>,
    hod_name: Option<String>,
}

fn non_empty(name: &str, value: Option<String>) -> Result<Option<String>> {
    value.map(|value| required_field(name, &value)).transpose()
}

pub async fn list_departments(State(state): State<AppState>) -> Result<Json<Vec<DepartmentView>>> {
    Ok(Json(state.db.list_departments().await?))
}

pub async fn create_department(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateDepartmentRequest>,
) -> Result<(StatusCode, Json<DepartmentView>)> {
    let code = required_field("department_code", &payload.department_code)?.to_uppercase();
    let name = required_field("department_name", &payload.department_name)?;
    let hod = HodAssignment {
        email: validated_email(&payload.hod_email)?,
        name: payload.hod_name,
    };

    let department = state.db.create_department(&code, &name, hod).await?;
    tracing::info!(
        department_id = department.department_id,
        code = %department.department_code,
        "department created"
    );

    Ok((StatusCode::CREATED, Json(department)))
}

pub async fn get_department(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DepartmentView>> {
    state
        .db
        .get_department(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Department not found".to_string()))
}

pub async fn update_department(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Json<DepartmentView>> {
    let request: UpdateDepartmentRequest = parse_update(
        body,
        &["department_code", "department_name", "hod_email", "hod_name"],
    )?;

    let hod = match (request.hod_email, request.hod_name) {
        (Some(email), name) => Some(HodAssignment {
            email: validated_email(&email)?,
            name,
        }),
        (None, Some(_)) => {
            return Err(AppError::Validation(
                "Field 'hod_name' requires 'hod_email'".to_string(),
            ))
        }
        (None, None) => None,
    };

    let changes = DepartmentChanges {
        department_code: non_empty("department_code", request.department_code)?
            .map(|code| code.to_uppercase()),
        department_name: non_empty("department_name", request.department_name)?,
        hod,
    };

    let department = state.db.update_department(id, changes).await?;
    tracing::info!(department_id = id, "department updated");

    Ok(Json(department))
}

pub async fn delete_department(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    state.db.delete_department(id).await?;
    tracing::info!(department_id = id, "department deleted");

    Ok(Json(MessageResponse::new("Department deleted")))
}
