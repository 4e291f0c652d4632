use anyhow::Context;
use auth_rs::api::ApiServer;
use auth_rs::store;
use auth_rs::{Config, TwoFactorService};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "auth-rs")]
#[command(about = "Login and two-factor authentication API", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    init_logging(&config);
    info!("Starting auth-rs v{}", env!("CARGO_PKG_VERSION"));

    config.ensure_signing_key();

    info!("Configuration loaded");
    info!("  API listening on: {}", config.server.listen_addr);
    info!("  Database: {}", config.database.url);

    let db = store::connect(&config.database.url).await?;
    let service = TwoFactorService::new(db, &config.auth)?;
    let server = ApiServer::new(service, config.server.listen_addr.clone());

    #[cfg(unix)]
    spawn_reload_handler(
        server.state(),
        cli.config.clone(),
        config.auth.jwt_secret.clone(),
    );

    let listener = TcpListener::bind(&config.server.listen_addr).await?;
    server.serve(listener, shutdown_signal()).await?;

    info!("auth-rs stopped");
    Ok(())
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("auth_rs={},tower_http=info", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Re-read the configuration on SIGHUP and apply it. Without a configured
/// key, the key in use is kept.
#[cfg(unix)]
fn spawn_reload_handler(
    state: std::sync::Arc<auth_rs::api::AppState>,
    path: Option<PathBuf>,
    mut signing_key: String,
) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to install SIGHUP handler: {}", e);
                return;
            }
        };

        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading configuration");

            let result = Config::load(path.as_deref()).map(|mut config| {
                config.keep_signing_key(&signing_key);
                config
            });

            match result {
                Ok(config) => match state.service.reload(&config.auth).await {
                    Ok(()) => signing_key = config.auth.jwt_secret,
                    Err(e) => error!("Failed to apply reloaded configuration: {}", e),
                },
                Err(e) => error!("Failed to reload configuration: {}", e),
            }
        }
    });
}
