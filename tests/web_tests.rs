//! Session-based web surface tests
//!
//! The session cookie is carried by hand between requests so each test can
//! see exactly which response issued it.

mod common;

use axum::http::StatusCode;
use axum_test::{TestResponse, TestServer};
use common::{add_account, add_department, add_student, server, test_state, PASSWORD};
use registrar::types::Role;

const SESSION_COOKIE: &str = "id";

fn assert_redirect(response: &TestResponse, to: &str) {
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), to);
}

async fn web_login(server: &TestServer, email: &str, password: &str) -> TestResponse {
    server
        .post("/login")
        .form(&[("email", email), ("password", password)])
        .await
}

#[tokio::test]
async fn test_pages_require_session() {
    let state = test_state().await;
    let server = server(&state);

    assert_redirect(&server.get("/admin").await, "/");
    assert_redirect(&server.get("/dashboard").await, "/");
    server.get("/").await.assert_status_ok();
}

#[tokio::test]
async fn test_admin_login_flow() {
    let state = test_state().await;
    add_account(&state, "admin@uni.edu", Role::Admin, None).await;
    let server = server(&state);

    let response = web_login(&server, "admin@uni.edu", PASSWORD).await;
    let cookie = response.cookie(SESSION_COOKIE);
    assert_redirect(&response, "/admin");

    let page = server.get("/admin").add_cookie(cookie.clone()).await;
    page.assert_status_ok();
    assert!(page.text().contains("Departments: 0"));

    // Already signed in: the login page forwards to the landing page.
    assert_redirect(&server.get("/").add_cookie(cookie).await, "/admin");
}

#[tokio::test]
async fn test_failed_login_flashes_error() {
    let state = test_state().await;
    add_account(&state, "admin@uni.edu", Role::Admin, None).await;
    let server = server(&state);

    let response = web_login(&server, "admin@uni.edu", "wrong-password").await;
    let cookie = response.cookie(SESSION_COOKIE);
    assert_redirect(&response, "/");

    let page = server.get("/").add_cookie(cookie.clone()).await;
    assert!(page.text().contains("Invalid credentials"));

    // Flash messages are shown once.
    let again = server.get("/").add_cookie(cookie).await;
    assert!(!again.text().contains("Invalid credentials"));
}

#[tokio::test]
async fn test_login_issues_fresh_session_id() {
    let state = test_state().await;
    add_account(&state, "admin@uni.edu", Role::Admin, None).await;
    let server = server(&state);

    // The failed attempt leaves a flash, so the browser already holds an id.
    let before = web_login(&server, "admin@uni.edu", "wrong-password")
        .await
        .cookie(SESSION_COOKIE);

    let response = server
        .post("/login")
        .add_cookie(before.clone())
        .form(&[("email", "admin@uni.edu"), ("password", PASSWORD)])
        .await;
    assert_redirect(&response, "/admin");
    let after = response.cookie(SESSION_COOKIE);

    assert_ne!(before.value(), after.value());
    assert_redirect(&server.get("/admin").add_cookie(before).await, "/");
    server.get("/admin").add_cookie(after).await.assert_status_ok();
}

#[tokio::test]
async fn test_non_admin_is_sent_to_dashboard() {
    let state = test_state().await;
    add_department(&state, "CSE", "hod@uni.edu").await;
    let server = server(&state);

    let response = web_login(&server, "hod@uni.edu", PASSWORD).await;
    let cookie = response.cookie(SESSION_COOKIE);
    assert_redirect(&response, "/dashboard");

    assert_redirect(&server.get("/admin").add_cookie(cookie.clone()).await, "/dashboard");

    let page = server.get("/dashboard").add_cookie(cookie).await;
    page.assert_status_ok();
    let text = page.text();
    assert!(text.contains("You do not have permission to perform this action"));
    assert!(text.contains("HOD"));
}

#[tokio::test]
async fn test_admin_cannot_toggle_own_account() {
    let state = test_state().await;
    let admin = add_account(&state, "admin@uni.edu", Role::Admin, None).await;
    let server = server(&state);
    let cookie = web_login(&server, "admin@uni.edu", PASSWORD).await.cookie(SESSION_COOKIE);

    let response = server
        .post(&format!("/admin/users/{}/toggle", admin.user_id))
        .add_cookie(cookie.clone())
        .await;
    assert_redirect(&response, "/admin/users");

    let page = server.get("/admin/users").add_cookie(cookie).await;
    assert!(page
        .text()
        .contains("You cannot perform this action on your own account"));
    assert!(state.db.get_account(admin.user_id).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_admin_toggles_other_account() {
    let state = test_state().await;
    add_account(&state, "admin@uni.edu", Role::Admin, None).await;
    let dept = add_department(&state, "CSE", "hod@uni.edu").await;
    let staff = add_account(&state, "staff@uni.edu", Role::Staff, Some(dept)).await;
    let server = server(&state);
    let cookie = web_login(&server, "admin@uni.edu", PASSWORD).await.cookie(SESSION_COOKIE);

    let response = server
        .post(&format!("/admin/users/{}/toggle", staff.user_id))
        .add_cookie(cookie)
        .await;
    assert_redirect(&response, "/admin/users");

    assert!(!state.db.get_account(staff.user_id).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_deactivated_session_is_dropped() {
    let state = test_state().await;
    let dept = add_department(&state, "CSE", "hod@uni.edu").await;
    let staff = add_account(&state, "staff@uni.edu", Role::Staff, Some(dept)).await;
    let server = server(&state);
    let cookie = web_login(&server, "staff@uni.edu", PASSWORD).await.cookie(SESSION_COOKIE);

    server
        .get("/dashboard")
        .add_cookie(cookie.clone())
        .await
        .assert_status_ok();

    state.db.set_account_active(staff.user_id, false).await.unwrap();

    assert_redirect(&server.get("/dashboard").add_cookie(cookie).await, "/");
}

#[tokio::test]
async fn test_admin_adds_user() {
    let state = test_state().await;
    add_account(&state, "admin@uni.edu", Role::Admin, None).await;
    let dept = add_department(&state, "CSE", "hod@uni.edu").await;
    let server = server(&state);
    let cookie = web_login(&server, "admin@uni.edu", PASSWORD).await.cookie(SESSION_COOKIE);

    let department = dept.to_string();
    let response = server
        .post("/admin/users")
        .add_cookie(cookie.clone())
        .form(&[
            ("full_name", "New Faculty"),
            ("email", "newfac@uni.edu"),
            ("password", "initial-pass"),
            ("user_type", "FACULTY"),
            ("department_id", department.as_str()),
        ])
        .await;
    assert_redirect(&response, "/admin/users");

    let account = state
        .db
        .get_account_by_email("newfac@uni.edu")
        .await
        .unwrap()
        .expect("account created");
    assert_eq!(account.role, Role::Faculty);
    assert!(state.db.has_faculty_profile(account.user_id).await.unwrap());

    let page = server.get("/admin/users").add_cookie(cookie).await;
    assert!(page.text().contains("User newfac@uni.edu added"));
}

#[tokio::test]
async fn test_second_hod_is_refused() {
    let state = test_state().await;
    add_account(&state, "admin@uni.edu", Role::Admin, None).await;
    let dept = add_department(&state, "CSE", "hod@uni.edu").await;
    let server = server(&state);
    let cookie = web_login(&server, "admin@uni.edu", PASSWORD).await.cookie(SESSION_COOKIE);

    let department = dept.to_string();
    server
        .post("/admin/users")
        .add_cookie(cookie.clone())
        .form(&[
            ("full_name", "Second Head"),
            ("email", "second@uni.edu"),
            ("password", "initial-pass"),
            ("user_type", "HOD"),
            ("department_id", department.as_str()),
        ])
        .await;

    assert!(state
        .db
        .get_account_by_email("second@uni.edu")
        .await
        .unwrap()
        .is_none());
    let page = server.get("/admin/users").add_cookie(cookie).await;
    assert!(page.text().contains("Department already has a HOD"));
}

#[tokio::test]
async fn test_department_role_needs_department() {
    let state = test_state().await;
    add_account(&state, "admin@uni.edu", Role::Admin, None).await;
    let server = server(&state);
    let cookie = web_login(&server, "admin@uni.edu", PASSWORD).await.cookie(SESSION_COOKIE);

    server
        .post("/admin/users")
        .add_cookie(cookie.clone())
        .form(&[
            ("full_name", "Lost Student"),
            ("email", "lost@uni.edu"),
            ("password", "initial-pass"),
            ("user_type", "STUDENT"),
            ("department_id", ""),
        ])
        .await;

    let page = server.get("/admin/users").add_cookie(cookie).await;
    assert!(page.text().contains("A STUDENT account requires a department"));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let state = test_state().await;
    add_account(&state, "admin@uni.edu", Role::Admin, None).await;
    let server = server(&state);
    let cookie = web_login(&server, "admin@uni.edu", PASSWORD).await.cookie(SESSION_COOKIE);

    let response = server.get("/logout").add_cookie(cookie.clone()).await;
    assert_redirect(&response, "/");

    assert_redirect(&server.get("/admin").add_cookie(cookie).await, "/");
}

#[tokio::test]
async fn test_student_saves_profile() {
    let state = test_state().await;
    let dept = add_department(&state, "CSE", "hod@uni.edu").await;
    let student = add_student(&state, "stu@uni.edu", dept, "CS001").await;
    let server = server(&state);
    let cookie = web_login(&server, "stu@uni.edu", PASSWORD).await.cookie(SESSION_COOKIE);

    let dashboard = server.get("/dashboard").add_cookie(cookie.clone()).await;
    assert!(dashboard.text().contains(r#"href="/profile""#));

    let response = server
        .post("/profile")
        .add_cookie(cookie.clone())
        .form(&[
            ("email", "stu@uni.edu"),
            ("password", ""),
            ("date_of_birth", "2004-05-17"),
            ("phone_number_self", "9876543210"),
            ("phone_number_guardian", ""),
            ("current_address", "Hostel <4>"),
            ("permanent_address", ""),
        ])
        .await;
    assert_redirect(&response, "/profile");

    let page = server.get("/profile").add_cookie(cookie).await;
    page.assert_status_ok();
    let text = page.text();
    assert!(text.contains("Your profile has been updated successfully"));
    assert!(text.contains("CS001"));
    assert!(text.contains("Hostel &lt;4&gt;"));

    let profile = state
        .db
        .get_student_profile(student.user_id)
        .await
        .unwrap()
        .expect("profile");
    assert_eq!(profile.date_of_birth.as_deref(), Some("2004-05-17"));
}

#[tokio::test]
async fn test_student_profile_flashes_taken_email() {
    let state = test_state().await;
    let dept = add_department(&state, "CSE", "hod@uni.edu").await;
    add_student(&state, "stu@uni.edu", dept, "CS001").await;
    let server = server(&state);
    let cookie = web_login(&server, "stu@uni.edu", PASSWORD).await.cookie(SESSION_COOKIE);

    let response = server
        .post("/profile")
        .add_cookie(cookie.clone())
        .form(&[("email", "hod@uni.edu"), ("date_of_birth", "2004-05-17")])
        .await;
    assert_redirect(&response, "/profile");

    let page = server.get("/profile").add_cookie(cookie).await;
    assert!(page
        .text()
        .contains("This email address is already in use by another account"));
    assert!(state.db.get_account_by_email("stu@uni.edu").await.unwrap().is_some());
}

#[tokio::test]
async fn test_profile_page_is_for_students() {
    let state = test_state().await;
    add_department(&state, "CSE", "hod@uni.edu").await;
    let server = server(&state);
    let cookie = web_login(&server, "hod@uni.edu", PASSWORD).await.cookie(SESSION_COOKIE);

    assert_redirect(&server.get("/profile").add_cookie(cookie).await, "/dashboard");
}
