use crate::types::{AppError, Result, Role};
use serde::{Deserialize, Serialize};
use tower_sessions::{
    cookie::time::{Duration, OffsetDateTime},
    Expiry, Session,
};

pub const SESSION_USER_KEY: &str = "registrar.user";
pub const FLASH_KEY: &str = "registrar.flash";

/// What the server remembers about a logged-in browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: i64,
    pub role_name: Role,
    pub login_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

/// One-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }
}

fn session_err(err: tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("Session store error: {}", err))
}

pub async fn current(session: &Session) -> Result<Option<SessionData>> {
    session
        .get::<SessionData>(SESSION_USER_KEY)
        .await
        .map_err(session_err)
}

/// Binds `data` to the session under a fresh id so a pre-login id cannot be
/// reused after authentication. The login lasts `ttl_secs` from now, however
/// active the browser is.
pub async fn establish(session: &Session, data: &SessionData, ttl_secs: i64) -> Result<()> {
    session.cycle_id().await.map_err(session_err)?;
    session.set_expiry(Some(Expiry::AtDateTime(
        OffsetDateTime::now_utc() + Duration::seconds(ttl_secs),
    )));
    session
        .insert(SESSION_USER_KEY, data)
        .await
        .map_err(session_err)
}

/// Drops every value held by the session. Safe to call when already empty.
pub async fn destroy(session: &Session) -> Result<()> {
    session.flush().await.map_err(session_err)
}

pub async fn set_flash(session: &Session, flash: Flash) -> Result<()> {
    session.insert(FLASH_KEY, flash).await.map_err(session_err)
}

pub async fn take_flash(session: &Session) -> Result<Option<Flash>> {
    session.remove::<Flash>(FLASH_KEY).await.map_err(session_err)
}
