//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use axum_test::TestServer;
use registrar::{
    auth::password::hash_password,
    create_app,
    db::HodAssignment,
    types::{Account, NewAccount, Role},
    utils::toml_config::RegistrarConfig,
    AppState, DbClient,
};
use serde_json::{json, Value};

pub const SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "correct-horse-battery";

/// Config with a rate limit loose enough not to interfere.
pub fn test_config() -> RegistrarConfig {
    let mut config = RegistrarConfig::default();
    config.rate_limit.max_requests = 10_000;
    config
}

pub async fn test_state() -> AppState {
    test_state_with(test_config()).await
}

pub async fn test_state_with(config: RegistrarConfig) -> AppState {
    let db = DbClient::new_memory()
        .await
        .expect("Failed to create in-memory database");
    AppState::new(config, db, SECRET).expect("Failed to build state")
}

pub fn server(state: &AppState) -> TestServer {
    TestServer::new(create_app(state.clone())).expect("Failed to create test server")
}

pub async fn add_account(
    state: &AppState,
    email: &str,
    role: Role,
    department_id: Option<i64>,
) -> Account {
    state
        .db
        .create_account(NewAccount {
            full_name: format!("{} user", role),
            email: email.to_string(),
            password_hash: hash_password(PASSWORD).expect("hash"),
            role,
            department_id,
            batch_id: None,
            roll_number: None,
        })
        .await
        .expect("Failed to create account")
}

/// A STUDENT account in `department_id` holding `roll_number`.
pub async fn add_student(
    state: &AppState,
    email: &str,
    department_id: i64,
    roll_number: &str,
) -> Account {
    state
        .db
        .create_account(NewAccount {
            full_name: format!("Student {}", roll_number),
            email: email.to_string(),
            password_hash: hash_password(PASSWORD).expect("hash"),
            role: Role::Student,
            department_id: Some(department_id),
            batch_id: None,
            roll_number: Some(roll_number.to_string()),
        })
        .await
        .expect("Failed to create student")
}

/// Creates a department whose HOD is `hod_email` and returns its id. The
/// HOD's password is [`PASSWORD`].
pub async fn add_department(state: &AppState, code: &str, hod_email: &str) -> i64 {
    let department = state
        .db
        .create_department(
            code,
            &format!("Department of {}", code),
            HodAssignment {
                email: hod_email.to_string(),
                name: Some(format!("{} head", code)),
            },
        )
        .await
        .expect("Failed to create department");

    let hod = state
        .db
        .get_account_by_email(hod_email)
        .await
        .expect("lookup")
        .expect("HOD exists");
    state
        .db
        .update_account(
            hod.user_id,
            registrar::types::AccountChanges {
                password_hash: Some(hash_password(PASSWORD).expect("hash")),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to set HOD password");

    department.department_id
}

pub async fn login(server: &TestServer, email: &str, password: &str) -> String {
    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": email, "password": password }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["token"]
        .as_str()
        .expect("token in response")
        .to_string()
}
