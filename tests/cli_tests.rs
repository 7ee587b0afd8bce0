//! CLI integration tests for registrar-server
//!
//! Runs the built binary against temporary directories.

use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_registrar(args: &[&str], working_dir: Option<&std::path::Path>) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_registrar-server"));
    cmd.args(args)
        .arg("--no-color")
        .env_remove("REGISTRAR_JWT_SECRET")
        .env_remove("REGISTRAR_ADMIN_PASSWORD");

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    cmd.output().expect("Failed to execute command")
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = run_registrar(&["--help"], None);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"));
    assert!(stdout.contains("init"));
    assert!(stdout.contains("create-admin"));
}

#[test]
fn test_version_command() {
    let output = run_registrar(&["--version"], None);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("registrar-server"));
}

// =============================================================================
// Init Command Tests
// =============================================================================

#[test]
fn test_init_creates_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let temp_path = temp_dir.path().to_str().unwrap();

    let output = run_registrar(&["init", temp_path, "--port", "4100"], None);
    assert!(output.status.success(), "Init command failed: {:?}", output);

    let content =
        fs::read_to_string(temp_dir.path().join("registrar.toml")).expect("registrar.toml");
    assert!(content.contains("port = 4100"));
    assert!(content.contains("[rate_limit]"));

    let env = fs::read_to_string(temp_dir.path().join(".env.example")).expect(".env.example");
    assert!(env.contains("REGISTRAR_JWT_SECRET"));
    assert!(temp_dir.path().join("data").is_dir());
}

#[test]
fn test_init_twice_keeps_existing_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("registrar.toml");
    fs::write(&config_path, "# hand edited\n").unwrap();

    let output = run_registrar(&["init", temp_dir.path().to_str().unwrap()], None);

    assert!(output.status.success());
    assert_eq!(fs::read_to_string(&config_path).unwrap(), "# hand edited\n");
}

// =============================================================================
// Serve and Admin Bootstrap
// =============================================================================

#[test]
fn test_serve_without_secret_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    run_registrar(&["init", "."], Some(temp_dir.path()));

    let output = run_registrar(&["serve"], Some(temp_dir.path()));

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stderr.contains("REGISTRAR_JWT_SECRET") || stdout.contains("REGISTRAR_JWT_SECRET"),
        "missing secret should be named: {} {}",
        stdout,
        stderr
    );
}

#[test]
fn test_create_admin_writes_account() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    run_registrar(&["init", "."], Some(temp_dir.path()));

    let output = run_registrar(
        &[
            "create-admin",
            "--email",
            "Root@Uni.edu",
            "--name",
            "Root",
            "--password",
            "bootstrap-password",
        ],
        Some(temp_dir.path()),
    );
    assert!(output.status.success(), "create-admin failed: {:?}", output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("root@uni.edu"));

    // Same email again is a conflict.
    let again = run_registrar(
        &["create-admin", "--email", "root@uni.edu", "--name", "Root"],
        Some(temp_dir.path()),
    );
    assert!(!again.status.success());
    assert!(temp_dir.path().join("data").join("registrar.db").exists());
}
