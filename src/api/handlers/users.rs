//! Department user management (HOD only).
//!
//! A HOD manages the FACULTY, STAFF and STUDENT accounts of their own
//! department. Accounts outside that set read as 404.

use crate::{
    auth::guard::{forbid_self, own_department, require_own_department},
    auth::password::default_password_hash,
    types::{
        parse_update, required_field, validated_email, Account, AccountChanges, AccountView,
        ApiJson, AppError, MessageResponse, NewAccount, Principal, Result, Role,
    },
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;

pub const MAX_BULK_ROWS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub user_type: String,
    pub batch_id: Option<i64>,
    /// STUDENT accounts only.
    pub roll_number: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkCreateRequest {
    #[serde(default)]
    pub users: Vec<CreateUserRequest>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RowError {
    pub row: usize,
    pub error: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActivateRequest {
    #[serde(default)]
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    full_name: Option<String>,
    email: Option<String>,
    user_type: Option<String>,
    batch_id: Option<i64>,
    roll_number: Option<String>,
}

fn managed_role(value: &str) -> Result<Role> {
    let role: Role = value.parse()?;
    if Role::DEPARTMENT_MANAGED.contains(&role) {
        Ok(role)
    } else {
        Err(AppError::Validation(
            "User type must be FACULTY, STAFF or STUDENT".to_string(),
        ))
    }
}

/// Loads an account the principal is allowed to manage, or 404.
async fn load_managed(state: &AppState, principal: &Principal, user_id: i64) -> Result<Account> {
    let account = state
        .db
        .get_account(user_id)
        .await?
        .filter(|account| Role::DEPARTMENT_MANAGED.contains(&account.role))
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    match account.department_id {
        Some(department_id) => require_own_department(principal, department_id)?,
        None => return Err(AppError::NotFound("User not found".to_string())),
    }
    Ok(account)
}

/// A batch may only be assigned to students, and only from the HOD's own
/// department.
async fn check_batch(
    state: &AppState,
    principal: &Principal,
    role: Role,
    batch_id: Option<i64>,
) -> Result<()> {
    let Some(batch_id) = batch_id else {
        return Ok(());
    };
    if role != Role::Student {
        return Err(AppError::Validation(
            "Only STUDENT accounts can be assigned to a batch".to_string(),
        ));
    }
    let batch = state
        .db
        .get_batch(batch_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch not found".to_string()))?;
    require_own_department(principal, batch.department_id)
}

fn check_roll_number(role: Role, roll_number: Option<&str>) -> Result<Option<String>> {
    let Some(roll_number) = roll_number.map(str::trim).filter(|roll| !roll.is_empty()) else {
        return Ok(None);
    };
    if role != Role::Student {
        return Err(AppError::Validation(
            "Only STUDENT accounts have a roll number".to_string(),
        ));
    }
    Ok(Some(roll_number.to_string()))
}

/// Validates one creation row without touching the store beyond lookups.
async fn prepare_account(
    state: &AppState,
    principal: &Principal,
    department_id: i64,
    request: &CreateUserRequest,
) -> Result<NewAccount> {
    let full_name = required_field("full_name", &request.full_name)?;
    let email = validated_email(&request.email)?;
    let role = managed_role(&request.user_type)?;
    check_batch(state, principal, role, request.batch_id).await?;
    let roll_number = check_roll_number(role, request.roll_number.as_deref())?;

    Ok(NewAccount {
        full_name,
        password_hash: default_password_hash(&email)?,
        email,
        role,
        department_id: Some(department_id),
        batch_id: request.batch_id,
        roll_number,
    })
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<AccountView>>> {
    let department_id = own_department(&principal)?;
    let accounts = state.db.list_department_accounts(department_id).await?;

    Ok(Json(accounts.iter().map(AccountView::from).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<AccountView>)> {
    let department_id = own_department(&principal)?;
    let new = prepare_account(&state, &principal, department_id, &payload).await?;

    let account = state.db.create_account(new).await?;
    tracing::info!(
        user_id = account.user_id,
        role = %account.role,
        created_by = principal.user_id,
        "user created"
    );

    Ok((StatusCode::CREATED, Json(AccountView::from(&account))))
}

/// Creates up to [`MAX_BULK_ROWS`] users. Invalid rows are reported and
/// skipped; the valid rows are written in a single transaction.
pub async fn bulk_create_users(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(payload): ApiJson<BulkCreateRequest>,
) -> Result<Response> {
    let department_id = own_department(&principal)?;

    if payload.users.is_empty() {
        return Err(AppError::Validation("No users provided".to_string()));
    }
    if payload.users.len() > MAX_BULK_ROWS {
        return Err(AppError::Validation(format!(
            "At most {} users can be created at once",
            MAX_BULK_ROWS
        )));
    }

    let mut accepted = Vec::new();
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut seen_rolls = HashSet::new();

    for (index, request) in payload.users.iter().enumerate() {
        let row = index + 1;
        let prepared = match prepare_account(&state, &principal, department_id, request).await {
            Ok(new) => new,
            Err(err) => {
                errors.push(RowError {
                    row,
                    error: err.client_message(),
                });
                continue;
            }
        };

        if !seen.insert(prepared.email.clone())
            || state.db.get_account_by_email(&prepared.email).await?.is_some()
        {
            errors.push(RowError {
                row,
                error: "Email already exists".to_string(),
            });
            continue;
        }
        if let Some(roll_number) = &prepared.roll_number {
            if !seen_rolls.insert(roll_number.clone())
                || state.db.roll_number_exists(roll_number).await?
            {
                errors.push(RowError {
                    row,
                    error: "Roll number already exists".to_string(),
                });
                continue;
            }
        }
        accepted.push(prepared);
    }

    if accepted.is_empty() {
        let body = serde_json::json!({
            "error": "No valid users to create",
            "errors": errors,
        });
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }

    let ids = state.db.create_accounts(accepted).await?;
    tracing::info!(
        created = ids.len(),
        rejected = errors.len(),
        created_by = principal.user_id,
        "bulk user creation"
    );

    let body = serde_json::json!({
        "message": format!("{} users created", ids.len()),
        "created": ids.len(),
        "user_ids": ids,
        "errors": errors,
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub async fn activate_users(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(payload): ApiJson<ActivateRequest>,
) -> Result<Json<serde_json::Value>> {
    let department_id = own_department(&principal)?;
    if payload.user_ids.is_empty() {
        return Err(AppError::Validation("Field 'user_ids' is required".to_string()));
    }

    let activated = state
        .db
        .activate_department_accounts(department_id, &payload.user_ids)
        .await?;

    Ok(Json(serde_json::json!({
        "message": format!("{} users activated", activated),
        "activated": activated,
    })))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Json<AccountView>> {
    let account = load_managed(&state, &principal, id).await?;
    Ok(Json(AccountView::from(&account)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Json<AccountView>> {
    forbid_self(&principal, id)?;
    let request: UpdateUserRequest =
        parse_update(body, &["full_name", "email", "user_type", "batch_id", "roll_number"])?;
    let current = load_managed(&state, &principal, id).await?;

    let role = request
        .user_type
        .as_deref()
        .map(managed_role)
        .transpose()?;
    check_batch(
        &state,
        &principal,
        role.unwrap_or(current.role),
        request.batch_id,
    )
    .await?;
    let roll_number = match request.roll_number.as_deref() {
        Some(roll_number) => Some(
            check_roll_number(role.unwrap_or(current.role), Some(roll_number))?
                .unwrap_or_default(),
        ),
        None => None,
    };

    let changes = AccountChanges {
        full_name: request
            .full_name
            .map(|name| required_field("full_name", &name))
            .transpose()?,
        email: request
            .email
            .map(|email| validated_email(&email))
            .transpose()?,
        role,
        department_id: None,
        batch_id: request.batch_id,
        roll_number,
        password_hash: None,
    };

    let account = state.db.update_account(id, changes).await?;
    if account.role != current.role {
        tracing::info!(user_id = id, from = %current.role, to = %account.role, "user type changed");
    }

    Ok(Json(AccountView::from(&account)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    forbid_self(&principal, id)?;
    load_managed(&state, &principal, id).await?;

    state.db.delete_account(id).await?;
    tracing::info!(user_id = id, deleted_by = principal.user_id, "user deleted");

    Ok(Json(MessageResponse::new("User deleted")))
}

async fn set_status(
    state: &AppState,
    principal: &Principal,
    id: i64,
    active: bool,
) -> Result<Json<MessageResponse>> {
    forbid_self(principal, id)?;
    load_managed(state, principal, id).await?;

    state.db.set_account_active(id, active).await?;
    tracing::info!(user_id = id, active, changed_by = principal.user_id, "user status changed");

    Ok(Json(MessageResponse::new(if active {
        "User activated"
    } else {
        "User deactivated"
    })))
}

pub async fn activate_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    set_status(&state, &principal, id, true).await
}

pub async fn deactivate_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    set_status(&state, &principal, id, false).await
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let account = load_managed(&state, &principal, id).await?;

    let changes = AccountChanges {
        password_hash: Some(default_password_hash(&account.email)?),
        ..AccountChanges::default()
    };
    state.db.update_account(id, changes).await?;
    tracing::info!(user_id = id, reset_by = principal.user_id, "password reset");

    Ok(Json(MessageResponse::new("Password reset to default")))
}
