use crate::{
    auth::jwt::{extract_bearer, hash_token},
    auth::password::{check_new_password, hash_password},
    types::{
        parse_update, validated_email, AccountChanges, ApiJson, AppError, LoginRequest,
        MeResponse, MessageResponse, Principal, Result, TokenResponse, UpdateProfileRequest,
    },
    AppState,
};
use axum::{extract::State, http::HeaderMap, Extension, Json};
use chrono::Utc;

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Missing fields or invalid email"),
        (status = 401, description = "Invalid credentials or inactive account"),
        (status = 429, description = "Rate limit exceeded")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    let email = validated_email(&payload.email)?;
    if payload.password.is_empty() {
        return Err(AppError::Validation(
            "Field 'password' is required".to_string(),
        ));
    }

    let account = state
        .authenticator
        .authenticate_password(&email, &payload.password)
        .await?;

    let tokens = state.authenticator.tokens();
    let token = tokens.issue(&account.principal())?;
    tracing::info!(user_id = account.user_id, role = %account.role, "token issued");

    Ok(Json(TokenResponse {
        token,
        expires_in: tokens.ttl_secs(),
        user_type: account.role,
    }))
}

/// Current principal
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Authenticated account", body = MeResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(("bearer" = []))
)]
pub async fn me(Extension(principal): Extension<Principal>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: principal.user_id,
        user_type: principal.role,
        department_id: principal.department_id,
        full_name: principal.full_name,
        email: principal.email,
    })
}

/// Self-service profile update. Only name and password may change.
#[utoipa::path(
    put,
    path = "/api/auth/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = MessageResponse),
        (status = 400, description = "Field not allowed or invalid"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(("bearer" = []))
)]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Json<MessageResponse>> {
    let request: UpdateProfileRequest = parse_update(body, &["full_name", "password"])?;

    let mut changes = AccountChanges::default();
    if let Some(full_name) = request.full_name {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(AppError::Validation(
                "Field 'full_name' cannot be empty".to_string(),
            ));
        }
        changes.full_name = Some(full_name.to_string());
    }
    if let Some(password) = request.password {
        check_new_password(&password)?;
        changes.password_hash = Some(hash_password(&password)?);
    }

    state.db.update_account(principal.user_id, changes).await?;
    tracing::info!(user_id = principal.user_id, "profile updated");

    Ok(Json(MessageResponse::new("Profile updated")))
}

/// Revoke the presented token
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Token revoked", body = MessageResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(("bearer" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>> {
    let token = extract_bearer(&headers)
        .ok_or_else(|| AppError::Unauthorized("Missing or invalid Authorization header".to_string()))?;
    let claims = state.authenticator.tokens().verify(&token)?;

    state
        .db
        .revoke_token(&hash_token(&token), claims.exp, Utc::now().timestamp())
        .await?;
    tracing::info!(user_id = principal.user_id, "token revoked");

    Ok(Json(MessageResponse::new("Logged out")))
}
