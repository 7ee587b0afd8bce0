//! Session-based web surface.
//!
//! Pages authenticate through the session cookie. Every state change answers
//! with a 303 redirect and leaves a flash message for the next page.

pub mod handlers;
pub mod pages;

use crate::auth::{
    guard::{require_role, AnyRole, RolePolicy},
    session::{self, Flash},
    Credential,
};
use crate::types::{Principal, Role};
use crate::AppState;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use std::marker::PhantomData;
use tower_sessions::{
    cookie::{time::Duration, SameSite},
    Expiry, MemoryStore, Session, SessionManagerLayer,
};

/// Landing page for a role after login.
pub fn home_for(role: Role) -> &'static str {
    match role {
        Role::Admin => "/admin",
        _ => "/dashboard",
    }
}

/// Session-authenticated principal allowed by policy `P`.
///
/// No session redirects to the login page; a role outside `P` redirects to
/// the principal's own landing page with an error flash.
pub struct WebUser<P: RolePolicy = AnyRole> {
    pub principal: Principal,
    pub session: Session,
    _policy: PhantomData<P>,
}

impl<P: RolePolicy> FromRequestParts<AppState> for WebUser<P> {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        let data = match session::current(&session).await {
            Ok(Some(data)) => data,
            Ok(None) => return Err(Redirect::to("/").into_response()),
            Err(err) => return Err(err.into_response()),
        };

        let principal = match state
            .authenticator
            .resolve(&Credential::Session(data))
            .await
        {
            Ok(principal) => principal,
            Err(err) => {
                if let Err(e) = session::destroy(&session).await {
                    tracing::error!(error = %e, "failed to clear stale session");
                }
                store_flash(&session, Flash::error(err.client_message())).await;
                return Err(Redirect::to("/").into_response());
            }
        };

        if let Err(err) = require_role(&principal, P::ALLOWED) {
            store_flash(&session, Flash::error(err.client_message())).await;
            return Err(Redirect::to(home_for(principal.role)).into_response());
        }

        Ok(Self {
            principal,
            session,
            _policy: PhantomData,
        })
    }
}

/// Stores the outcome as a flash message and redirects (303) to `to`.
pub async fn flash_redirect(session: &Session, outcome: crate::types::Result<String>, to: &str) -> Response {
    let flash = match outcome {
        Ok(message) => Flash::success(message),
        Err(err) => {
            if err.status().is_server_error() {
                tracing::error!(error = %err, "web request failed");
            }
            Flash::error(err.client_message())
        }
    };

    store_flash(session, flash).await;
    Redirect::to(to).into_response()
}

/// Leaves `flash` for the next page. A store failure loses the message, not
/// the redirect.
async fn store_flash(session: &Session, flash: Flash) {
    if let Err(e) = session::set_flash(session, flash).await {
        tracing::error!(error = %e, "failed to store flash message");
    }
}

/// Cookie session layer for the web routes. Anonymous sessions (flash only)
/// expire after `session_ttl_secs` of inactivity; logins get a fixed expiry
/// from [`session::establish`].
pub fn session_layer(session_ttl_secs: i64, secure: bool) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_path("/")
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(secure)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(session_ttl_secs)))
}

pub fn create_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::login_page))
        .route("/login", post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route("/admin", get(handlers::admin_dashboard))
        .route(
            "/admin/users",
            get(handlers::admin_users).post(handlers::add_user),
        )
        .route("/admin/users/{id}", post(handlers::edit_user))
        .route("/admin/users/{id}/toggle", post(handlers::toggle_user))
        .route("/dashboard", get(handlers::dashboard))
        .route(
            "/profile",
            get(handlers::student_profile).post(handlers::update_student_profile),
        )
        .layer(session_layer(
            state.config.auth.session_ttl_secs,
            state.config.auth.secure_cookies,
        ))
}
