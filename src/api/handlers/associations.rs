//! Faculty-student associations.
//!
//! Association types are reference data kept by ADMIN. Assignments are made
//! by ADMIN across departments or by STAFF inside their own department.

use crate::{
    api::handlers::users::MAX_BULK_ROWS,
    auth::guard::own_department,
    types::{
        parse_roll_numbers, parse_update, required_field, ApiJson, AppError, Association,
        AssociationType, MessageResponse, Principal, Result, Role,
    },
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssociationTypeRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRequest {
    pub faculty_id: Option<i64>,
    pub association_type_id: Option<i64>,
    /// Comma-separated roll numbers.
    #[serde(default)]
    pub roll_numbers: String,
}

#[derive(Debug, Deserialize)]
pub struct AssociationFilter {
    pub faculty_id: Option<i64>,
}

/// Department an assignment is confined to; `None` for ADMIN.
fn assignment_scope(principal: &Principal) -> Result<Option<i64>> {
    if principal.role == Role::Admin {
        Ok(None)
    } else {
        own_department(principal).map(Some)
    }
}

pub async fn list_association_types(
    State(state): State<AppState>,
) -> Result<Json<Vec<AssociationType>>> {
    Ok(Json(state.db.list_association_types().await?))
}

pub async fn get_association_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AssociationType>> {
    state
        .db
        .get_association_type(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Association type not found".to_string()))
}

pub async fn create_association_type(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<AssociationTypeRequest>,
) -> Result<(StatusCode, Json<AssociationType>)> {
    let name = required_field("name", &payload.name)?;
    let association_type = state.db.create_association_type(&name).await?;

    Ok((StatusCode::CREATED, Json(association_type)))
}

pub async fn update_association_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Json<AssociationType>> {
    let request: AssociationTypeRequest = parse_update(body, &["name"])?;
    let name = required_field("name", &request.name)?;

    Ok(Json(state.db.update_association_type(id, &name).await?))
}

pub async fn delete_association_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    state.db.delete_association_type(id).await?;
    Ok(Json(MessageResponse::new("Association type deleted")))
}

pub async fn list_associations(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<AssociationFilter>,
) -> Result<Json<Vec<Association>>> {
    let department_id = assignment_scope(&principal)?;
    Ok(Json(
        state
            .db
            .list_associations(filter.faculty_id, department_id)
            .await?,
    ))
}

/// Links one faculty member to a list of students by roll number.
///
/// Roll numbers that match no student, or that are already linked under the
/// same type, are reported back; the rest are written together.
pub async fn assign_students(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(payload): ApiJson<AssignRequest>,
) -> Result<Json<serde_json::Value>> {
    let department_id = assignment_scope(&principal)?;

    let (Some(faculty_id), Some(association_type_id)) =
        (payload.faculty_id, payload.association_type_id)
    else {
        return Err(AppError::Validation("All fields are required".to_string()));
    };
    if payload.roll_numbers.trim().is_empty() {
        return Err(AppError::Validation("All fields are required".to_string()));
    }

    let roll_numbers = parse_roll_numbers(&payload.roll_numbers);
    if roll_numbers.is_empty() {
        return Err(AppError::Validation(
            "Please provide at least one valid roll number".to_string(),
        ));
    }
    if roll_numbers.len() > MAX_BULK_ROWS {
        return Err(AppError::Validation(format!(
            "At most {} roll numbers can be assigned at once",
            MAX_BULK_ROWS
        )));
    }

    let outcome = state
        .db
        .assign_students(faculty_id, association_type_id, &roll_numbers, department_id)
        .await?;
    tracing::info!(
        faculty_id,
        association_type_id,
        assigned = outcome.assigned,
        already_assigned = outcome.already_assigned.len(),
        not_found = outcome.not_found.len(),
        assigned_by = principal.user_id,
        "students assigned"
    );

    Ok(Json(serde_json::json!({
        "message": "Assignment complete",
        "assigned": outcome.assigned,
        "already_assigned": outcome.already_assigned,
        "not_found": outcome.not_found,
    })))
}

pub async fn remove_association(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((faculty_id, student_id, association_type_id)): Path<(i64, i64, i64)>,
) -> Result<Json<MessageResponse>> {
    let department_id = assignment_scope(&principal)?;
    state
        .db
        .remove_association(faculty_id, student_id, association_type_id, department_id)
        .await?;
    tracing::info!(
        faculty_id,
        student_id,
        association_type_id,
        removed_by = principal.user_id,
        "association removed"
    );

    Ok(Json(MessageResponse::new("Association removed")))
}
