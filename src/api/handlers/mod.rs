//! API request handlers.
//!
//! Handlers receive the authenticated [`Principal`](crate::types::Principal)
//! through request extensions; department scoping happens here, after the
//! resource is loaded.

/// Login, profile and token revocation.
pub mod auth;
pub mod associations;
pub mod batches;
pub mod degrees;
pub mod departments;
pub mod programmes;
pub mod students;
pub mod users;
