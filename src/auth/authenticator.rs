use super::jwt::{hash_token, TokenService};
use super::password::{verify_dummy, verify_password};
use super::session::SessionData;
use crate::db::DbClient;
use crate::types::{normalize_email, Account, AppError, Claims, Principal, Result};
use std::sync::Arc;

/// Why a password login was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password. Callers must not tell these apart.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account is inactive")]
    AccountInactive,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

/// A credential presented with a request, already verified for integrity.
#[derive(Debug, Clone)]
pub enum Credential {
    Session(SessionData),
    Token { claims: Claims, raw: String },
}

impl Credential {
    fn user_id(&self) -> i64 {
        match self {
            Credential::Session(data) => data.user_id,
            Credential::Token { claims, .. } => claims.uid,
        }
    }
}

/// Turns passwords, sessions and tokens into a [`Principal`], always
/// re-checking the account against the store.
pub struct Authenticator {
    db: Arc<DbClient>,
    tokens: Arc<TokenService>,
}

impl Authenticator {
    pub fn new(db: Arc<DbClient>, tokens: Arc<TokenService>) -> Self {
        Self { db, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Checks an email/password pair.
    ///
    /// A missing account still pays for one hash verification so the two
    /// failure paths take comparable time.
    pub async fn authenticate_password(&self, email: &str, password: &str) -> Result<Account> {
        let email = normalize_email(email);

        let Some(account) = self.db.get_account_by_email(&email).await? else {
            verify_dummy(password);
            tracing::warn!(email = %email, "login failed");
            return Err(AuthError::InvalidCredentials.into());
        };

        if !verify_password(password, &account.password_hash)? {
            tracing::warn!(email = %email, "login failed");
            return Err(AuthError::InvalidCredentials.into());
        }

        if !account.is_active {
            tracing::warn!(user_id = account.user_id, "login refused for inactive account");
            return Err(AuthError::AccountInactive.into());
        }

        Ok(account)
    }

    /// Resolves a credential to the current principal.
    ///
    /// Revoked tokens, deleted accounts and inactive accounts are all 401.
    pub async fn resolve(&self, credential: &Credential) -> Result<Principal> {
        if let Credential::Token { raw, .. } = credential {
            if self.db.is_token_revoked(&hash_token(raw)).await? {
                return Err(AppError::Unauthorized("Token has been revoked".to_string()));
            }
        }

        let account = self
            .db
            .get_account(credential.user_id())
            .await?
            .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;

        if !account.is_active {
            return Err(AuthError::AccountInactive.into());
        }

        Ok(account.principal())
    }

    /// Verifies a raw bearer token and resolves it.
    pub async fn resolve_token(&self, raw: &str) -> Result<Principal> {
        let claims = self.tokens.verify(raw)?;
        self.resolve(&Credential::Token {
            claims,
            raw: raw.to_string(),
        })
        .await
    }
}
