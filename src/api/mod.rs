//! HTTP API Handlers and Routes
//!
//! The token-authenticated REST surface, built on Axum and mounted at `/api`.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and role guards
//!
//! # API Endpoints
//!
//! ## Authentication (`/api/auth`)
//! - `POST /api/auth/login` - Exchange email and password for a token
//! - `GET /api/auth/me` - Current account
//! - `PUT /api/auth/me` - Change own name or password
//! - `POST /api/auth/logout` - Revoke the presented token
//!
//! ## Administration (ADMIN)
//! - `GET|POST /api/departments`, `GET|PUT|DELETE /api/departments/{id}`
//! - `GET|POST /api/degrees`, `GET|PUT|DELETE /api/degrees/{id}`
//!
//! ## Department users (HOD)
//! - `GET|POST /api/users`, `POST /api/users/bulk`, `PUT /api/users/activate`
//! - `GET|PUT|DELETE /api/users/{id}`
//! - `PUT /api/users/{id}/activate`, `PUT /api/users/{id}/deactivate`,
//!   `PUT /api/users/{id}/reset-password`
//!
//! ## Academic records
//! - `GET /api/programmes[/{id}]`, `GET /api/batches[/{id}]` - any department member
//! - `POST /api/programmes`, `PUT|DELETE /api/programmes/{id}` - HOD
//! - `POST /api/batches`, `PUT /api/batches/{id}` - HOD or STAFF
//! - `DELETE /api/batches/{id}` - HOD
//!
//! ## Associations
//! - `GET /api/association-types[/{id}]` - any role
//! - `POST /api/association-types`, `PUT|DELETE /api/association-types/{id}` - ADMIN
//! - `GET|POST /api/associations`,
//!   `DELETE /api/associations/{faculty_id}/{student_id}/{association_type_id}` -
//!   ADMIN, or STAFF inside their department
//!
//! ## Students
//! - `GET|PUT /api/students/me` - own personal details, email and password
//!
//! # Authentication
//!
//! ```text
//! Authorization: Bearer <token>
//! ```
//!
//! Errors use the envelope `{"error": "..."}`.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

use crate::types::{LoginRequest, MeResponse, MessageResponse, Role, TokenResponse, UpdateProfileRequest};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

/// OpenAPI document served at `/api/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(title = "Registrar API"),
    paths(
        handlers::auth::login,
        handlers::auth::me,
        handlers::auth::update_me,
        handlers::auth::logout
    ),
    components(schemas(
        LoginRequest,
        TokenResponse,
        MeResponse,
        UpdateProfileRequest,
        MessageResponse,
        Role
    )),
    modifiers(&SecurityAddon),
    tags((name = "auth", description = "Token authentication"))
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
