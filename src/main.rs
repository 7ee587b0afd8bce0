//! Registrar server entry point
//!
//! - `registrar-server` / `registrar-server serve` - start the HTTP server
//! - `registrar-server init` - write a starter configuration
//! - `registrar-server create-admin` - bootstrap an ADMIN account

use anyhow::Context;
use registrar::{
    auth::password::{default_password_hash, hash_password},
    cli::{
        init::{self, InitConfig, InitResult},
        output::Output,
        Cli, Commands,
    },
    create_app,
    types::{validated_email, NewAccount, Role},
    utils::toml_config::{LogFormat, RegistrarConfig},
    AppState, DbClient,
};
use std::{net::SocketAddr, path::Path};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    if let Err(e) = run(cli, &output).await {
        output.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &Output) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Init {
            path,
            force,
            host,
            port,
        }) => match init::run(
            InitConfig {
                path,
                force,
                host,
                port,
            },
            output,
        ) {
            InitResult::Success | InitResult::AlreadyExists => Ok(()),
            InitResult::Error(e) => anyhow::bail!(e),
        },
        Some(Commands::CreateAdmin {
            email,
            name,
            password,
        }) => {
            let config = read_settings(&cli.config)?;
            init_tracing(&config, cli.verbose);
            create_admin(&config, &email, &name, password, output).await
        }
        None | Some(Commands::Serve) => {
            if !cli.config.exists() {
                output.hint("Run 'registrar-server init' to create a configuration");
            }
            let config = RegistrarConfig::load(&cli.config)
                .with_context(|| format!("Failed to load {}", cli.config.display()))?;
            init_tracing(&config, cli.verbose);
            output.banner();
            serve(config).await
        }
    }
}

/// Config values that do not need the signing secret.
fn read_settings(path: &Path) -> anyhow::Result<RegistrarConfig> {
    if !path.exists() {
        return Ok(RegistrarConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(RegistrarConfig::parse(&content)?)
}

fn init_tracing(config: &RegistrarConfig, verbose: bool) {
    let default_level = if verbose {
        "debug"
    } else {
        config.server.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("registrar={0},tower_http={0}", default_level)));

    let registry = tracing_subscriber::registry().with(filter);
    match config.server.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn create_admin(
    config: &RegistrarConfig,
    email: &str,
    name: &str,
    password: Option<String>,
    output: &Output,
) -> anyhow::Result<()> {
    let email = validated_email(email)?;
    let full_name = name.trim();
    if full_name.is_empty() {
        anyhow::bail!("--name must not be empty");
    }

    let password_hash = match password.as_deref() {
        Some(password) if !password.is_empty() => hash_password(password)?,
        _ => default_password_hash(&email)?,
    };

    let db = DbClient::new(&config.database.url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    let account = db
        .create_account(NewAccount {
            full_name: full_name.to_string(),
            email,
            password_hash,
            role: Role::Admin,
            department_id: None,
            batch_id: None,
            roll_number: None,
        })
        .await?;

    output.success(&format!(
        "Created ADMIN account {} (id {})",
        account.email, account.user_id
    ));
    if password.is_none() {
        output.warning("The account uses the default password; change it after logging in");
    }
    Ok(())
}

async fn serve(config: RegistrarConfig) -> anyhow::Result<()> {
    let secret = config.jwt_secret()?;
    let db = DbClient::new(&config.database.url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    tracing::info!(url = %config.database.url, "database ready");

    let addr = config.bind_address();
    let state = AppState::new(config, db, secret.as_bytes())?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "registrar listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
