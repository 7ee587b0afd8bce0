use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::OnceLock};
use utoipa::ToSchema;

// ============= Roles =============

/// Account role. Serialized in upper case (`"HOD"`), the form stored in the
/// database and carried in token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Hod,
    Staff,
    Faculty,
    Student,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Hod,
        Role::Staff,
        Role::Faculty,
        Role::Student,
    ];

    /// Roles a HOD may create or manage inside their department.
    pub const DEPARTMENT_MANAGED: [Role; 3] = [Role::Faculty, Role::Staff, Role::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Hod => "HOD",
            Role::Staff => "STAFF",
            Role::Faculty => "FACULTY",
            Role::Student => "STUDENT",
        }
    }

    /// Admin is the only global role; everyone else belongs to a department.
    pub fn is_department_scoped(&self) -> bool {
        !matches!(self, Role::Admin)
    }

    pub fn has_faculty_profile(&self) -> bool {
        matches!(self, Role::Hod | Role::Faculty)
    }

    pub fn has_student_profile(&self) -> bool {
        matches!(self, Role::Student)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::Validation(format!("Invalid user type '{}'", s)))
    }
}

// ============= Identity Types =============

/// Claims embedded in an API token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub uid: i64,
    pub email: String,
    pub user_type: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated identity, re-read from the store on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: i64,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub department_id: Option<i64>,
}

// ============= Store Rows =============

#[derive(Debug, Clone)]
pub struct Account {
    pub user_id: i64,
    pub role: Role,
    pub department_id: Option<i64>,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: i64,
}

impl Account {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role,
            department_id: self.department_id,
        }
    }
}

/// Account as exposed by the API (no password hash).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountView {
    pub user_id: i64,
    pub user_type: Role,
    pub department_id: Option<i64>,
    pub full_name: String,
    pub email: String,
    pub is_active: bool,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id,
            user_type: account.role,
            department_id: account.department_id,
            full_name: account.full_name.clone(),
            email: account.email.clone(),
            is_active: account.is_active,
        }
    }
}

/// Input for a new account; the password hash is computed by the caller.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub department_id: Option<i64>,
    pub batch_id: Option<i64>,
    /// Students only.
    pub roll_number: Option<String>,
}

/// Field-wise account changes; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub department_id: Option<i64>,
    pub batch_id: Option<i64>,
    pub roll_number: Option<String>,
    pub password_hash: Option<String>,
}

/// A student's profile row, including the details the student maintains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StudentProfile {
    pub user_id: i64,
    pub department_id: i64,
    pub batch_id: Option<i64>,
    pub roll_number: Option<String>,
    pub date_of_birth: Option<String>,
    pub phone_number_self: Option<String>,
    pub phone_number_guardian: Option<String>,
    pub current_address: Option<String>,
    pub permanent_address: Option<String>,
}

/// Self-maintained student details. Blank values clear the column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PersonalDetails {
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub phone_number_self: String,
    #[serde(default)]
    pub phone_number_guardian: String,
    #[serde(default)]
    pub current_address: String,
    #[serde(default)]
    pub permanent_address: String,
}

impl PersonalDetails {
    /// Trims every field and checks the date of birth is `YYYY-MM-DD`.
    pub fn normalized(&self) -> Result<Self> {
        let date_of_birth = self.date_of_birth.trim().to_string();
        if !date_of_birth.is_empty()
            && chrono::NaiveDate::parse_from_str(&date_of_birth, "%Y-%m-%d").is_err()
        {
            return Err(AppError::Validation(
                "Date of birth must be YYYY-MM-DD".to_string(),
            ));
        }

        Ok(Self {
            date_of_birth,
            phone_number_self: self.phone_number_self.trim().to_string(),
            phone_number_guardian: self.phone_number_guardian.trim().to_string(),
            current_address: self.current_address.trim().to_string(),
            permanent_address: self.permanent_address.trim().to_string(),
        })
    }
}

/// A student's self-service submission: their details plus login email and
/// an optional new password. Every field is plain text so the same type
/// decodes from JSON and from an HTML form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PersonalUpdate {
    #[serde(default)]
    pub email: String,
    /// Blank keeps the current password.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub phone_number_self: String,
    #[serde(default)]
    pub phone_number_guardian: String,
    #[serde(default)]
    pub current_address: String,
    #[serde(default)]
    pub permanent_address: String,
}

impl PersonalUpdate {
    pub fn details(&self) -> Result<PersonalDetails> {
        PersonalDetails {
            date_of_birth: self.date_of_birth.clone(),
            phone_number_self: self.phone_number_self.clone(),
            phone_number_guardian: self.phone_number_guardian.clone(),
            current_address: self.current_address.clone(),
            permanent_address: self.permanent_address.clone(),
        }
        .normalized()
    }
}

/// Kind of link between a faculty member and a student, such as "Mentor".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AssociationType {
    pub association_type_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Association {
    pub faculty_id: i64,
    pub faculty_name: String,
    pub student_id: i64,
    pub student_name: String,
    pub roll_number: Option<String>,
    pub association_type_id: i64,
    pub association_type: String,
}

/// Per-roll-number result of a bulk assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AssignmentOutcome {
    pub assigned: usize,
    pub already_assigned: Vec<String>,
    pub not_found: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepartmentView {
    pub department_id: i64,
    pub department_code: String,
    pub department_name: String,
    pub hod_name: Option<String>,
    pub hod_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DegreeLevel {
    pub degree_level_id: i64,
    pub level_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Programme {
    pub programme_id: i64,
    pub programme_name: String,
    pub degree_level_id: i64,
    pub degree_level: Option<String>,
    pub minimum_duration_years: i64,
    pub maximum_duration_years: Option<i64>,
    pub department_id: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProgrammeChanges {
    pub programme_name: Option<String>,
    pub degree_level_id: Option<i64>,
    pub minimum_duration_years: Option<i64>,
    pub maximum_duration_years: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Semester {
    Spring,
    Autumn,
}

impl Semester {
    pub fn as_str(&self) -> &'static str {
        match self {
            Semester::Spring => "SPRING",
            Semester::Autumn => "AUTUMN",
        }
    }
}

impl FromStr for Semester {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SPRING" => Ok(Semester::Spring),
            "AUTUMN" => Ok(Semester::Autumn),
            _ => Err(AppError::Validation(
                "Invalid semester. Must be SPRING or AUTUMN".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Batch {
    pub batch_id: i64,
    pub programme_id: i64,
    pub programme_name: Option<String>,
    pub department_id: i64,
    pub batch_name: String,
    pub start_year: i64,
    pub start_semester: Semester,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BatchChanges {
    pub batch_name: Option<String>,
    pub start_year: Option<i64>,
    pub start_semester: Option<Semester>,
    pub is_active: Option<bool>,
}

// ============= Authentication Types =============

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: i64,
    pub user_type: Role,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user_id: i64,
    pub user_type: Role,
    pub department_id: Option<i64>,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============= Validation Helpers =============

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
    })
}

/// Trims and lower-cases an email for lookups and uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Normalizes and validates an email in one step.
pub fn validated_email(email: &str) -> Result<String> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AppError::Validation("Field 'email' is required".to_string()));
    }
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email format".to_string()));
    }
    Ok(email)
}

/// Returns the trimmed value or a field-level validation error.
pub fn required_field(name: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("Field '{}' is required", name)));
    }
    Ok(value.to_string())
}

/// Splits a comma-separated roll number list, dropping blanks.
pub fn parse_roll_numbers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|roll| !roll.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decodes a partial-update body, rejecting fields outside `allowed` and
/// empty bodies.
pub fn parse_update<T: DeserializeOwned>(body: serde_json::Value, allowed: &[&str]) -> Result<T> {
    let map = body
        .as_object()
        .ok_or_else(|| AppError::Validation("Invalid JSON input".to_string()))?;

    if let Some(key) = map.keys().find(|key| !allowed.contains(&key.as_str())) {
        return Err(AppError::Validation(format!(
            "Field '{}' is not allowed for update",
            key
        )));
    }
    if map.is_empty() {
        return Err(AppError::Validation(
            "No fields provided for update".to_string(),
        ));
    }

    serde_json::from_value(body).map_err(|e| AppError::Validation(e.to_string()))
}

// ============= Request Extractors =============

/// JSON body extractor whose rejection uses the API error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge;
        }
        AppError::Validation(format!("Invalid JSON input: {}", rejection.body_text()))
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Message safe to show to a client. Server-side failures are reduced to
    /// a generic message; the detail only goes to the log.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::RateLimited => "Rate limit exceeded".to_string(),
            AppError::PayloadTooLarge => "Request body too large".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": self.client_message()
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<libsql::Error> for AppError {
    fn from(err: libsql::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ADMIN", Role::Admin)]
    #[case("hod", Role::Hod)]
    #[case(" Staff ", Role::Staff)]
    #[case("faculty", Role::Faculty)]
    #[case("STUDENT", Role::Student)]
    fn test_role_parsing(#[case] input: &str, #[case] expected: Role) {
        assert_eq!(input.parse::<Role>().expect("role should parse"), expected);
    }

    #[test]
    fn test_parse_roll_numbers() {
        assert_eq!(
            parse_roll_numbers(" CS101, ,CS102,,  CS103 "),
            vec!["CS101", "CS102", "CS103"]
        );
        assert!(parse_roll_numbers(" , ").is_empty());
    }

    #[rstest]
    #[case("2001-02-28", true)]
    #[case("", true)]
    #[case("2001-02-30", false)]
    #[case("28/02/2001", false)]
    fn test_personal_details_date(#[case] date: &str, #[case] ok: bool) {
        let details = PersonalDetails {
            date_of_birth: date.to_string(),
            ..Default::default()
        };
        assert_eq!(details.normalized().is_ok(), ok);
    }

    #[test]
    fn test_unknown_role_is_validation_error() {
        let err = "dean".parse::<Role>().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_role_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Role::Hod).unwrap(), "\"HOD\"");
    }

    #[rstest]
    #[case(AppError::Validation("x".into()), StatusCode::BAD_REQUEST)]
    #[case(AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED)]
    #[case(AppError::Forbidden("x".into()), StatusCode::FORBIDDEN)]
    #[case(AppError::NotFound("x".into()), StatusCode::NOT_FOUND)]
    #[case(AppError::Conflict("x".into()), StatusCode::CONFLICT)]
    #[case(AppError::RateLimited, StatusCode::TOO_MANY_REQUESTS)]
    #[case(AppError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_error_status_mapping(#[case] err: AppError, #[case] expected: StatusCode) {
        assert_eq!(err.status(), expected);
    }

    #[test]
    fn test_database_error_message_is_generic() {
        let err = AppError::Database("UNIQUE constraint failed: user_accounts.email".into());
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_email_normalization_and_validation() {
        assert_eq!(validated_email(" Alice@Example.COM ").unwrap(), "alice@example.com");
        assert!(validated_email("not-an-email").is_err());
        assert!(validated_email("").is_err());
    }

    #[test]
    fn test_parse_update_rejects_unknown_fields() {
        let body = serde_json::json!({"full_name": "A", "is_active": false});
        let err = parse_update::<UpdateProfileRequest>(body, &["full_name", "password"])
            .unwrap_err();
        assert_eq!(err.client_message(), "Field 'is_active' is not allowed for update");
    }

    #[test]
    fn test_parse_update_rejects_empty_body() {
        let err = parse_update::<UpdateProfileRequest>(serde_json::json!({}), &["full_name"])
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
