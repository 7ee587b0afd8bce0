//! CLI module for Registrar
//!
//! Command-line parsing for the registrar-server binary. Uses clap for
//! argument parsing and owo-colors for terminal output.

pub mod init;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Registrar - student, faculty and department management server
#[derive(Parser, Debug)]
#[command(
    name = "registrar-server",
    version,
    about = "Registrar - student, faculty and department management server",
    long_about = "Serves the session-based admin web surface and the token-based REST API.\n\n\
                  Run without arguments to start the server, or use 'init' to write a starter config.",
    after_help = "EXAMPLES:\n    \
                  registrar-server init                                  # Write registrar.toml and .env.example\n    \
                  registrar-server create-admin --email a@uni.edu --name Admin\n    \
                  registrar-server                                       # Start the server\n    \
                  registrar-server --config my.toml                      # Use a custom config file"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "registrar.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Write a starter registrar.toml, .env.example and .gitignore
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value = "3000")]
        port: u16,
    },

    /// Create an ADMIN account
    ///
    /// Without --password the account gets the default password (its
    /// lower-cased email); change it after the first login.
    CreateAdmin {
        #[arg(long)]
        email: String,

        #[arg(long)]
        name: String,

        #[arg(long, env = "REGISTRAR_ADMIN_PASSWORD")]
        password: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::try_parse_from(["registrar-server"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("registrar.toml"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_create_admin_args() {
        let cli = Cli::try_parse_from([
            "registrar-server",
            "--config",
            "alt.toml",
            "create-admin",
            "--email",
            "root@uni.edu",
            "--name",
            "Root",
            "--password",
            "hunter22",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert_eq!(
            cli.command,
            Some(Commands::CreateAdmin {
                email: "root@uni.edu".to_string(),
                name: "Root".to_string(),
                password: Some("hunter22".to_string()),
            })
        );
    }

    #[test]
    fn test_init_args() {
        let cli = Cli::try_parse_from(["registrar-server", "init", "--force", "--port", "9000"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Init { force: true, port: 9000, .. })
        ));
    }
}
