//! TOML-based configuration for Registrar
//!
//! Infrastructure settings come from `registrar.toml`. Every section and
//! field has a default, so a minimal file only names what differs. Secrets
//! are never written in the file: it names the environment variable that
//! holds them (usually populated from `.env`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Minimum length of the token signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Root configuration structure loaded from registrar.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrarConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

// ============= Authentication Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable name containing the token signing secret
    #[serde(default = "default_jwt_secret_env")]
    pub jwt_secret_env: String,

    /// API token lifetime in seconds
    #[serde(default = "default_ttl")]
    pub token_ttl_secs: i64,

    /// Web session lifetime in seconds
    #[serde(default = "default_ttl")]
    pub session_ttl_secs: i64,

    /// Mark the session cookie `Secure` (set when served over HTTPS)
    #[serde(default)]
    pub secure_cookies: bool,
}

fn default_jwt_secret_env() -> String {
    "REGISTRAR_JWT_SECRET".to_string()
}

fn default_ttl() -> i64 {
    3600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret_env: default_jwt_secret_env(),
            token_ttl_secs: default_ttl(),
            session_ttl_secs: default_ttl(),
            secure_cookies: false,
        }
    }
}

// ============= Database Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Local database path, `file:` URL, or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "./data/registrar.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

// ============= Rate Limit Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitStoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: i64,

    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    #[serde(default)]
    pub store: RateLimitStoreKind,

    /// Directory for the `file` store
    #[serde(default = "default_rate_limit_dir")]
    pub dir: PathBuf,

    /// Key clients by the first `X-Forwarded-For` hop. Only enable behind a
    /// proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_window_secs() -> i64 {
    60
}

fn default_max_requests() -> u32 {
    60
}

fn default_rate_limit_dir() -> PathBuf {
    PathBuf::from("./data/rate_limits")
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            store: RateLimitStoreKind::default(),
            dir: default_rate_limit_dir(),
            trust_forwarded_for: false,
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Secret in '{0}' must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret(String),
}

impl RegistrarConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;

        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the environment.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: RegistrarConfig = toml::from_str(content)?;
        config.validate_settings()?;
        Ok(config)
    }

    /// Full validation, including the signing secret.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_settings()?;
        self.jwt_secret()?;
        Ok(())
    }

    /// Checks every value that does not depend on the environment.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        if self.auth.token_ttl_secs <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.token_ttl_secs must be positive".to_string(),
            ));
        }
        if self.auth.session_ttl_secs <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_ttl_secs must be positive".to_string(),
            ));
        }
        if self.rate_limit.window_secs <= 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.window_secs must be positive".to_string(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.max_requests must be positive".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the token signing secret from the environment
    pub fn jwt_secret(&self) -> Result<String, ConfigError> {
        let name = &self.auth.jwt_secret_env;
        let secret =
            std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;

        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret(name.to_string()));
        }
        Ok(secret)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
