//! # Registrar
//!
//! A role-based student, faculty and department management server.
//!
//! Two surfaces share one authentication and authorization layer:
//!
//! 1. **Web** - session cookie, server-rendered pages, flash messages and
//!    303 redirects. Used by administrators to manage accounts.
//! 2. **REST API** - bearer tokens under `/api`, JSON in and out, used by
//!    administrators, heads of department and staff.
//!
//! ## Roles
//!
//! | Role | Scope |
//! |------|-------|
//! | `ADMIN` | Departments, degree levels, every account |
//! | `HOD` | Accounts, programmes and batches of their own department |
//! | `STAFF` | Batches of their own department |
//! | `FACULTY` | Read access to their department's records |
//! | `STUDENT` | Read access to their department's records |
//!
//! ## Library usage
//!
//! ```rust,ignore
//! use registrar::{create_app, AppState, DbClient, RegistrarConfig};
//!
//! let config = RegistrarConfig::load("registrar.toml")?;
//! let secret = config.jwt_secret()?;
//! let db = DbClient::new(&config.database.url).await?;
//! let state = AppState::new(config, db, secret.as_bytes())?;
//! let app = create_app(state);
//! ```
//!
//! ## Modules
//!
//! - [`api`] - REST handlers and routes
//! - [`auth`] - passwords, tokens, sessions, guards and rate limiting
//! - [`db`] - libsql storage
//! - [`web`] - session-based pages
//! - [`types`] - domain types and error handling
//! - [`utils`] - TOML configuration

#![warn(rustdoc::missing_crate_level_docs)]

/// Token-authenticated REST API.
pub mod api;
/// Authentication, authorization and rate limiting.
pub mod auth;
/// Command-line interface.
pub mod cli;
/// libsql storage for accounts and academic records.
pub mod db;
/// Core types (records, requests, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;
/// Session-based web surface.
pub mod web;

pub use auth::{Authenticator, RateLimiter, TokenService};
pub use db::DbClient;
pub use types::{AppError, Result};
pub use utils::toml_config::RegistrarConfig;

use crate::auth::rate_limit::{FileRateLimitStore, MemoryRateLimitStore, RateLimitStore};
use crate::utils::toml_config::RateLimitStoreKind;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

/// Request bodies above this size are rejected with 413.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Infrastructure configuration loaded at startup
    pub config: Arc<RegistrarConfig>,
    /// Database client
    pub db: Arc<DbClient>,
    /// Credential checks shared by both surfaces
    pub authenticator: Arc<Authenticator>,
    /// Per-client request limiter for the API
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wires the authenticator and rate limiter from `config`.
    pub fn new(config: RegistrarConfig, db: DbClient, jwt_secret: &[u8]) -> Result<Self> {
        let db = Arc::new(db);
        let tokens = Arc::new(TokenService::new(jwt_secret, config.auth.token_ttl_secs));
        let authenticator = Arc::new(Authenticator::new(db.clone(), tokens));

        let limits = &config.rate_limit;
        let store: Arc<dyn RateLimitStore> = match limits.store {
            RateLimitStoreKind::Memory => Arc::new(MemoryRateLimitStore::default()),
            RateLimitStoreKind::File => Arc::new(FileRateLimitStore::new(&limits.dir)?),
        };
        let rate_limiter = Arc::new(RateLimiter::new(
            store,
            limits.window_secs,
            limits.max_requests,
            limits.trust_forwarded_for,
        ));

        Ok(Self {
            config: Arc::new(config),
            db,
            authenticator,
            rate_limiter,
        })
    }
}

/// Builds the complete application: the REST API under `/api` and the web
/// pages at the root, with tracing, CORS, security headers and a body limit.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // Outermost first: tracing sees every request, including rejected ones.
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));

    Router::new()
        .nest("/api", api::routes::create_router(&state))
        .merge(web::create_router(&state))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware)
}
