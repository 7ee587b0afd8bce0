//! Init command implementation
//!
//! Writes a starter `registrar.toml`, `.env.example` and `.gitignore`.

use super::output::Output;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of the init operation
#[derive(Debug, PartialEq, Eq)]
pub enum InitResult {
    Success,
    /// registrar.toml exists and `--force` was not given
    AlreadyExists,
    Error(String),
}

pub struct InitConfig {
    pub path: PathBuf,
    pub force: bool,
    pub host: String,
    pub port: u16,
}

pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing Registrar");

    let base_path = &config.path;
    let config_path = base_path.join("registrar.toml");
    if config_path.exists() && !config.force {
        output.warning("registrar.toml already exists!");
        output.hint("Use --force to overwrite existing files");
        return InitResult::AlreadyExists;
    }

    let data_dir = base_path.join("data");
    if let Err(e) = fs::create_dir_all(&data_dir) {
        output.error(&format!("Failed to create data/: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("directory", "data");

    if let Err(e) = write_file(&config_path, &generate_registrar_toml(&config), config.force) {
        output.error(&format!("Failed to create registrar.toml: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("config", "registrar.toml");

    let env_path = base_path.join(".env.example");
    if let Err(e) = write_file(&env_path, ENV_EXAMPLE, config.force) {
        output.error(&format!("Failed to create .env.example: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("env", ".env.example");

    let gitignore_path = base_path.join(".gitignore");
    if gitignore_path.exists() {
        output.skipped(".gitignore", "already exists");
    } else if let Err(e) = write_file(&gitignore_path, GITIGNORE, false) {
        output.warning(&format!("Failed to create .gitignore: {}", e));
    } else {
        output.created("file", ".gitignore");
    }

    output.header("Next Steps");
    output.info("1. Set the signing secret (at least 32 bytes):");
    output.command("cp .env.example .env");
    output.info("2. Create the first administrator:");
    output.command("registrar-server create-admin --email admin@example.edu --name Admin");
    output.info("3. Start the server:");
    output.command("registrar-server");
    output.hint(&format!(
        "Server will be available at http://{}:{}",
        config.host, config.port
    ));

    InitResult::Success
}

fn write_file(path: &Path, content: &str, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Ok(());
    }
    fs::write(path, content)
}

fn generate_registrar_toml(config: &InitConfig) -> String {
    format!(
        r#"# Registrar configuration

[server]
host = "{host}"
port = {port}
log_level = "info"
# "text" or "json"
log_format = "text"

[auth]
# Environment variable holding the token signing secret (>= 32 bytes)
jwt_secret_env = "REGISTRAR_JWT_SECRET"
token_ttl_secs = 3600
session_ttl_secs = 3600
# Enable when served over HTTPS
secure_cookies = false

[database]
url = "./data/registrar.db"

[rate_limit]
window_secs = 60
max_requests = 60
# "memory" or "file"
store = "memory"
dir = "./data/rate_limits"
trust_forwarded_for = false
"#,
        host = config.host,
        port = config.port
    )
}

const ENV_EXAMPLE: &str = "# Token signing secret, at least 32 bytes
REGISTRAR_JWT_SECRET=change-me-to-a-long-random-string-of-32-bytes-or-more

# Log filter override
# RUST_LOG=registrar=debug,tower_http=debug
";

const GITIGNORE: &str = "/target
.env
data/
*.db
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::toml_config::RegistrarConfig;
    use tempfile::TempDir;

    fn create_test_config(temp_dir: &TempDir, force: bool) -> InitConfig {
        InitConfig {
            path: temp_dir.path().to_path_buf(),
            force,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }

    #[test]
    fn test_generated_toml_parses() {
        let temp_dir = TempDir::new().unwrap();
        let content = generate_registrar_toml(&create_test_config(&temp_dir, false));

        let config = RegistrarConfig::parse(&content).expect("generated config should parse");
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_run_creates_all_files() {
        let temp_dir = TempDir::new().unwrap();
        let result = run(create_test_config(&temp_dir, false), &Output::no_color());

        assert_eq!(result, InitResult::Success);
        assert!(temp_dir.path().join("registrar.toml").exists());
        assert!(temp_dir.path().join(".env.example").exists());
        assert!(temp_dir.path().join(".gitignore").exists());
        assert!(temp_dir.path().join("data").is_dir());
    }

    #[test]
    fn test_run_already_exists_without_force() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("registrar.toml"), "# mine").unwrap();

        let result = run(create_test_config(&temp_dir, false), &Output::no_color());
        assert_eq!(result, InitResult::AlreadyExists);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("registrar.toml")).unwrap(),
            "# mine"
        );
    }

    #[test]
    fn test_run_force_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("registrar.toml"), "# mine").unwrap();

        let result = run(create_test_config(&temp_dir, true), &Output::no_color());
        assert_eq!(result, InitResult::Success);
        let content = fs::read_to_string(temp_dir.path().join("registrar.toml")).unwrap();
        assert!(content.contains("[rate_limit]"));
    }
}
