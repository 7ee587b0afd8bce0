//! Authentication and Authorization
//!
//! Both entry points of the server share this layer: the cookie-session web
//! surface and the bearer-token REST API.
//!
//! # Module Structure
//!
//! - [`auth::password`](crate::auth::password) - Argon2id hashing and the default password policy
//! - [`auth::jwt`](crate::auth::jwt) - HS256 token issue/verify and bearer extraction
//! - [`auth::session`](crate::auth::session) - session data and flash messages
//! - [`auth::authenticator`](crate::auth::authenticator) - credential to principal resolution
//! - [`auth::guard`](crate::auth::guard) - role, department scope and self-protection checks
//! - [`auth::rate_limit`](crate::auth::rate_limit) - fixed-window limiter middleware
//!
//! # Request pipeline (API)
//!
//! ```text
//! rate limit -> bearer extraction -> verify -> revocation check
//!            -> account reload (active) -> role check -> handler -> department scope
//! ```
//!
//! ## Guarding routes
//!
//! ```ignore
//! use registrar::auth::guard::{guarded, HodOnly};
//!
//! let router = Router::new()
//!     .route("/users", guarded::<HodOnly>(&state, get(list_users)));
//! ```
//!
//! Handlers receive the principal explicitly:
//!
//! ```ignore
//! async fn list_users(Extension(principal): Extension<Principal>) -> impl IntoResponse {
//!     // ...
//! }
//! ```

pub mod authenticator;
pub mod guard;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod session;

pub use authenticator::{AuthError, Authenticator, Credential};
pub use jwt::{TokenError, TokenService};
pub use rate_limit::RateLimiter;
