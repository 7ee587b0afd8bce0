//! Student self-service (STUDENT only).

use crate::{
    auth::password::{check_new_password, hash_password},
    types::{
        validated_email, ApiJson, AppError, PersonalUpdate, Principal, Result, StudentProfile,
    },
    AppState,
};
use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StudentProfileView {
    pub full_name: String,
    pub email: String,
    #[serde(flatten)]
    pub profile: StudentProfile,
}

/// Validates and stores a student's own update. Shared with the web form.
pub async fn save_personal_update(
    state: &AppState,
    user_id: i64,
    update: &PersonalUpdate,
) -> Result<StudentProfile> {
    let details = update.details()?;
    let email = validated_email(&update.email)?;
    let password_hash = if update.password.is_empty() {
        None
    } else {
        check_new_password(&update.password)?;
        Some(hash_password(&update.password)?)
    };

    let profile = state
        .db
        .update_student_personal(user_id, &details, &email, password_hash)
        .await?;
    tracing::info!(user_id, "student details updated");
    Ok(profile)
}

pub async fn my_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<StudentProfileView>> {
    let profile = state
        .db
        .get_student_profile(principal.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student profile not found".to_string()))?;

    Ok(Json(StudentProfileView {
        full_name: principal.full_name,
        email: principal.email,
        profile,
    }))
}

pub async fn update_my_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(update): ApiJson<PersonalUpdate>,
) -> Result<Json<StudentProfileView>> {
    let profile = save_personal_update(&state, principal.user_id, &update).await?;
    let email = validated_email(&update.email)?;

    Ok(Json(StudentProfileView {
        full_name: principal.full_name,
        email,
        profile,
    }))
}
