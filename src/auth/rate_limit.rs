use crate::types::{AppError, Result};
use crate::AppState;
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

/// Request count for one client inside the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub first_request: i64,
    pub request_count: u32,
}

/// Where window records live between requests.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn load(&self, client: &str) -> Result<Option<WindowRecord>>;
    async fn save(&self, client: &str, record: WindowRecord) -> Result<()>;
    /// Drops records whose window started at or before `started_before`.
    /// Returns how many were removed.
    async fn prune(&self, started_before: i64) -> Result<usize>;
}

#[derive(Default)]
pub struct MemoryRateLimitStore {
    records: Mutex<HashMap<String, WindowRecord>>,
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn load(&self, client: &str) -> Result<Option<WindowRecord>> {
        Ok(self.records.lock().get(client).copied())
    }

    async fn save(&self, client: &str, record: WindowRecord) -> Result<()> {
        self.records.lock().insert(client.to_string(), record);
        Ok(())
    }

    async fn prune(&self, started_before: i64) -> Result<usize> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| record.first_request > started_before);
        Ok(before - records.len())
    }
}

/// One JSON file per client, named by a digest of the client address.
pub struct FileRateLimitStore {
    dir: PathBuf,
}

impl FileRateLimitStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AppError::Internal(format!(
                "Failed to create rate limit directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, client: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(client.as_bytes()));
        self.dir.join(format!("{}.json", digest))
    }
}

#[async_trait]
impl RateLimitStore for FileRateLimitStore {
    async fn load(&self, client: &str) -> Result<Option<WindowRecord>> {
        let path = self.path_for(client);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Internal(format!("Failed to read {}: {}", path.display(), e))),
        };

        // A corrupt record starts a fresh window.
        Ok(serde_json::from_str(&content).ok())
    }

    async fn save(&self, client: &str, record: WindowRecord) -> Result<()> {
        let path = self.path_for(client);
        let content = serde_json::to_string(&record)
            .map_err(|e| AppError::Internal(format!("Failed to encode rate limit record: {}", e)))?;

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write {}: {}", path.display(), e)))
    }

    async fn prune(&self, started_before: i64) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            AppError::Internal(format!("Failed to list {}: {}", self.dir.display(), e))
        })?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to list {}: {}", self.dir.display(), e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            // Unreadable or corrupt records would start a fresh window anyway.
            let stale = match tokio::fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str::<WindowRecord>(&content)
                    .map(|record| record.first_request <= started_before)
                    .unwrap_or(true),
                Err(_) => true,
            };
            if stale && tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Fixed-window limiter: at most `max_requests` per client per window.
///
/// Windows restart at the first request after expiry, so a burst straddling
/// a boundary can see up to twice the cap.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    window_secs: i64,
    max_requests: u32,
    trust_forwarded_for: bool,
    last_prune: AtomicI64,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        window_secs: i64,
        max_requests: u32,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            store,
            window_secs,
            max_requests,
            trust_forwarded_for,
            last_prune: AtomicI64::new(0),
        }
    }

    /// Counts a request from `client` at `now`. Returns `false` once the cap
    /// for the current window is reached.
    pub async fn check(&self, client: &str, now: i64) -> Result<bool> {
        match self.store.load(client).await? {
            Some(record) if now - record.first_request < self.window_secs => {
                if record.request_count >= self.max_requests {
                    return Ok(false);
                }
                self.store
                    .save(
                        client,
                        WindowRecord {
                            request_count: record.request_count + 1,
                            ..record
                        },
                    )
                    .await?;
                Ok(true)
            }
            _ => {
                self.prune_expired(now).await;
                self.store
                    .save(
                        client,
                        WindowRecord {
                            first_request: now,
                            request_count: 1,
                        },
                    )
                    .await?;
                Ok(true)
            }
        }
    }

    /// Sweeps expired windows out of the store, at most once per window.
    async fn prune_expired(&self, now: i64) {
        let last = self.last_prune.load(Ordering::Relaxed);
        if now - last < self.window_secs {
            return;
        }
        if self
            .last_prune
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        match self.store.prune(now - self.window_secs).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "pruned expired rate limit windows"),
            Err(e) => tracing::warn!(error = %e, "failed to prune rate limit windows"),
        }
    }

    /// Client key for a request: the peer address, or the first
    /// `X-Forwarded-For` hop when proxies are trusted.
    pub fn client_key(&self, req: &Request) -> String {
        if self.trust_forwarded_for {
            let forwarded = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty());
            if let Some(forwarded) = forwarded {
                return forwarded.to_string();
            }
        }

        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// First layer of the API stack; rejected requests never reach
/// authentication.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let limiter = &state.rate_limiter;
    let client = limiter.client_key(&req);

    match limiter.check(&client, Utc::now().timestamp()).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!(client = %client, "rate limit exceeded");
            AppError::RateLimited.into_response()
        }
        Err(e) => {
            // Store failures let the request through rather than lock everyone out.
            tracing::error!(client = %client, error = %e, "rate limit store unavailable");
            next.run(req).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn limiter(store: Arc<dyn RateLimitStore>) -> RateLimiter {
        RateLimiter::new(store, 60, 3, false)
    }

    #[tokio::test]
    async fn test_cap_within_window() {
        let limiter = limiter(Arc::new(MemoryRateLimitStore::default()));

        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1", 1_000).await.unwrap());
        }
        assert!(!limiter.check("10.0.0.1", 1_030).await.unwrap());
        assert!(limiter.check("10.0.0.2", 1_030).await.unwrap());
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = limiter(Arc::new(MemoryRateLimitStore::default()));

        for _ in 0..3 {
            limiter.check("10.0.0.1", 1_000).await.unwrap();
        }
        assert!(!limiter.check("10.0.0.1", 1_059).await.unwrap());
        assert!(limiter.check("10.0.0.1", 1_060).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_limiters() {
        let dir = tempfile::tempdir().unwrap();

        let first = limiter(Arc::new(FileRateLimitStore::new(dir.path()).unwrap()));
        for _ in 0..3 {
            assert!(first.check("192.168.1.5", 500).await.unwrap());
        }

        let second = limiter(Arc::new(FileRateLimitStore::new(dir.path()).unwrap()));
        assert!(!second.check("192.168.1.5", 510).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_windows_are_evicted() {
        let store = Arc::new(MemoryRateLimitStore::default());
        let limiter = limiter(store.clone());

        for i in 0..1_000 {
            limiter.check(&format!("10.1.{}.{}", i / 256, i % 256), 0).await.unwrap();
        }
        assert_eq!(store.records.lock().len(), 1_000);

        limiter.check("10.9.9.9", 50).await.unwrap();
        limiter.check("10.0.0.1", 100).await.unwrap();

        // The window opened at 50 is still live at 100.
        let records = store.records.lock();
        assert_eq!(records.len(), 2);
        assert!(records.contains_key("10.9.9.9"));
        assert!(records.contains_key("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_file_store_prunes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRateLimitStore::new(dir.path()).unwrap();

        store
            .save("old", WindowRecord { first_request: 100, request_count: 4 })
            .await
            .unwrap();
        store
            .save("fresh", WindowRecord { first_request: 900, request_count: 1 })
            .await
            .unwrap();
        std::fs::write(dir.path().join("garbage.json"), "not json").unwrap();

        assert_eq!(store.prune(500).await.unwrap(), 2);
        assert!(store.load("old").await.unwrap().is_none());
        assert!(store.load("fresh").await.unwrap().is_some());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_client_key_sources() {
        let trusted = RateLimiter::new(Arc::new(MemoryRateLimitStore::default()), 60, 3, true);
        let untrusted = limiter(Arc::new(MemoryRateLimitStore::default()));

        let mut req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(trusted.client_key(&req), "203.0.113.9");
        assert_eq!(untrusted.client_key(&req), "unknown");

        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(untrusted.client_key(&req), "127.0.0.1");
    }
}
