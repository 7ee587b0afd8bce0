use super::{flash_redirect, home_for, pages, WebUser};
use crate::api::handlers::students::save_personal_update;
use crate::auth::{
    guard::{forbid_self, AdminOnly, DepartmentMembers, StudentOnly},
    password::hash_password,
    session::{self, SessionData},
};
use crate::types::{
    required_field, validated_email, AccountChanges, AppError, NewAccount, PersonalUpdate, Result,
    Role,
};
use crate::AppState;
use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UserForm {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub user_type: String,
    #[serde(default)]
    pub department_id: String,
}

impl UserForm {
    fn department(&self) -> Result<Option<i64>> {
        let value = self.department_id.trim();
        if value.is_empty() {
            return Ok(None);
        }
        value
            .parse()
            .map(Some)
            .map_err(|_| AppError::Validation("Invalid department".to_string()))
    }
}

fn render_error(err: AppError) -> Response {
    tracing::error!(error = %err, "page render failed");
    err.into_response()
}

pub async fn login_page(State(state): State<AppState>, session: Session) -> Response {
    if let Ok(Some(data)) = session::current(&session).await {
        if state
            .authenticator
            .resolve(&crate::auth::Credential::Session(data.clone()))
            .await
            .is_ok()
        {
            return Redirect::to(home_for(data.role_name)).into_response();
        }
    }

    let flash = session::take_flash(&session).await.unwrap_or_default();
    pages::login(flash).into_response()
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let email = match validated_email(&form.email) {
        Ok(email) => email,
        Err(err) => return flash_redirect(&session, Err(err), "/").await,
    };
    if form.password.is_empty() {
        let err = AppError::Validation("Field 'password' is required".to_string());
        return flash_redirect(&session, Err(err), "/").await;
    }

    let account = match state
        .authenticator
        .authenticate_password(&email, &form.password)
        .await
    {
        Ok(account) => account,
        Err(err) => return flash_redirect(&session, Err(err), "/").await,
    };

    let data = SessionData {
        user_id: account.user_id,
        role_name: account.role,
        login_time: Utc::now().timestamp(),
    };
    if let Err(err) = session::establish(&session, &data, state.config.auth.session_ttl_secs).await {
        return flash_redirect(&session, Err(err), "/").await;
    }
    tracing::info!(user_id = account.user_id, role = %account.role, "session login");

    Redirect::to(home_for(account.role)).into_response()
}

pub async fn logout(session: Session) -> Response {
    if let Ok(Some(data)) = session::current(&session).await {
        tracing::info!(user_id = data.user_id, "session logout");
    }
    if let Err(err) = session::destroy(&session).await {
        return render_error(err);
    }
    flash_redirect(&session, Ok("You have been logged out".to_string()), "/").await
}

pub async fn admin_dashboard(State(state): State<AppState>, user: WebUser<AdminOnly>) -> Response {
    let counts = async {
        Ok::<_, AppError>(pages::AdminCounts {
            students: state.db.count_accounts_by_role(Role::Student).await?,
            faculty: state.db.count_accounts_by_role(Role::Faculty).await?
                + state.db.count_accounts_by_role(Role::Hod).await?,
            departments: state.db.count_departments().await?,
        })
    }
    .await;

    match counts {
        Ok(counts) => {
            let flash = session::take_flash(&user.session).await.unwrap_or_default();
            pages::admin_dashboard(&user.principal, &counts, flash).into_response()
        }
        Err(err) => render_error(err),
    }
}

pub async fn admin_users(State(state): State<AppState>, user: WebUser<AdminOnly>) -> Response {
    let listing = async {
        Ok::<_, AppError>((
            state.db.list_accounts().await?,
            state.db.list_departments().await?,
        ))
    }
    .await;

    match listing {
        Ok((accounts, departments)) => {
            let flash = session::take_flash(&user.session).await.unwrap_or_default();
            pages::admin_users(&user.principal, &accounts, &departments, flash).into_response()
        }
        Err(err) => render_error(err),
    }
}

/// Department rules for an account of `role` placed in `department_id`.
async fn check_department(
    state: &AppState,
    role: Role,
    department_id: Option<i64>,
    user_id: Option<i64>,
) -> Result<Option<i64>> {
    if !role.is_department_scoped() {
        return Ok(None);
    }

    let department_id = department_id.ok_or_else(|| {
        AppError::Validation(format!("A {} account requires a department", role))
    })?;
    let department = state
        .db
        .get_department(department_id)
        .await?
        .ok_or_else(|| AppError::Validation("Department does not exist".to_string()))?;

    if role == Role::Hod {
        if let Some(hod_email) = department.hod_email {
            let current = match user_id {
                Some(id) => state.db.get_account(id).await?.map(|account| account.email),
                None => None,
            };
            if current.as_deref() != Some(hod_email.as_str()) {
                return Err(AppError::Conflict(
                    "Department already has a HOD; reassign it from the department settings"
                        .to_string(),
                ));
            }
        }
    }

    Ok(Some(department_id))
}

pub async fn add_user(
    State(state): State<AppState>,
    user: WebUser<AdminOnly>,
    Form(form): Form<UserForm>,
) -> Response {
    let outcome = async {
        let full_name = required_field("full_name", &form.full_name)?;
        let email = validated_email(&form.email)?;
        let password = required_field("password", &form.password)?;
        let role: Role = form.user_type.parse()?;
        let department_id = check_department(&state, role, form.department()?, None).await?;

        let account = state
            .db
            .create_account(NewAccount {
                full_name,
                email,
                password_hash: hash_password(&password)?,
                role,
                department_id,
                batch_id: None,
                roll_number: None,
            })
            .await?;
        tracing::info!(user_id = account.user_id, role = %role, created_by = user.principal.user_id, "account added");

        Ok(format!("User {} added", account.email))
    }
    .await;

    flash_redirect(&user.session, outcome, "/admin/users").await
}

pub async fn edit_user(
    State(state): State<AppState>,
    user: WebUser<AdminOnly>,
    Path(id): Path<i64>,
    Form(form): Form<UserForm>,
) -> Response {
    let outcome = async {
        let full_name = required_field("full_name", &form.full_name)?;
        let email = validated_email(&form.email)?;
        let role: Role = form.user_type.parse()?;
        if role != Role::Admin {
            forbid_self(&user.principal, id)?;
        }
        let department_id = check_department(&state, role, form.department()?, Some(id)).await?;

        let password_hash = match form.password.trim() {
            "" => None,
            password => Some(hash_password(password)?),
        };

        let account = state
            .db
            .update_account(
                id,
                AccountChanges {
                    full_name: Some(full_name),
                    email: Some(email),
                    role: Some(role),
                    department_id,
                    password_hash,
                    ..AccountChanges::default()
                },
            )
            .await?;
        tracing::info!(user_id = id, updated_by = user.principal.user_id, "account updated");

        Ok(format!("User {} updated", account.email))
    }
    .await;

    flash_redirect(&user.session, outcome, "/admin/users").await
}

pub async fn toggle_user(
    State(state): State<AppState>,
    user: WebUser<AdminOnly>,
    Path(id): Path<i64>,
) -> Response {
    let outcome = async {
        forbid_self(&user.principal, id)?;
        let account = state
            .db
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let active = !account.is_active;
        state.db.set_account_active(id, active).await?;
        tracing::info!(user_id = id, active, changed_by = user.principal.user_id, "account toggled");

        Ok(if active {
            format!("User {} activated", account.email)
        } else {
            format!("User {} deactivated", account.email)
        })
    }
    .await;

    flash_redirect(&user.session, outcome, "/admin/users").await
}

pub async fn dashboard(user: WebUser<DepartmentMembers>) -> Html<String> {
    let flash = session::take_flash(&user.session).await.unwrap_or_default();
    pages::dashboard(&user.principal, flash)
}

pub async fn student_profile(
    State(state): State<AppState>,
    user: WebUser<StudentOnly>,
) -> Response {
    let flash = session::take_flash(&user.session).await.unwrap_or_default();
    match state.db.get_student_profile(user.principal.user_id).await {
        Ok(Some(profile)) => pages::student_profile(&user.principal, &profile, flash).into_response(),
        Ok(None) => render_error(AppError::NotFound(
            "Student profile not found".to_string(),
        )),
        Err(err) => render_error(err),
    }
}

pub async fn update_student_profile(
    State(state): State<AppState>,
    user: WebUser<StudentOnly>,
    Form(form): Form<PersonalUpdate>,
) -> Response {
    let outcome = save_personal_update(&state, user.principal.user_id, &form)
        .await
        .map(|_| "Your profile has been updated successfully".to_string());

    flash_redirect(&user.session, outcome, "/profile").await
}
