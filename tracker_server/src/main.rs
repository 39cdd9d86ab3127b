//! Certificate Tracker: graduation certificate collection registry.
//!
//! Staff upload spreadsheets of students whose certificates are ready,
//! mark certificates as collected when they are handed over, and export
//! collected / not-collected reports. A superuser-only admin panel manages
//! staff accounts and shows the activity log.

mod auth;
mod config;
mod db;
mod error;
mod metrics;
mod migration;
mod models;
mod pagination;
mod routes;
mod schema;
mod seeder;
mod services;
mod staticfiles;

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

use crate::config::{StaticConfig, TrackerConfig};

#[derive(Parser)]
#[command(name = "certificate-tracker", about = "Certificate Tracker registry server")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Tokio worker threads
    #[arg(short, long, env = "WORKERS", default_value = "3")]
    workers: usize,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply the database schema and exit
    Migrate,
    /// Copy static assets into STATIC_ROOT
    CollectStatic,
    /// Create a system administrator account
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, env = "SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let workers = cli.workers.max(1);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()?;

    runtime.block_on(run(cli))
}

fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::CollectStatic) => {
            let statics = StaticConfig::from_env();
            let copied = tokio::task::spawn_blocking(move || staticfiles::collect_static(&statics))
                .await??;
            println!("{copied} static files copied.");
            Ok(())
        }
        Some(Command::Migrate) => {
            let config = load_config(cli.database_url)?;
            let pool = db::build_pool(&config.database_url(), 1)?;
            migrate(&pool).await
        }
        Some(Command::CreateSuperuser {
            username,
            email,
            password,
        }) => {
            let config = load_config(cli.database_url)?;
            let pool = db::build_pool(&config.database_url(), 1)?;
            migrate(&pool).await?;

            let mut conn = pool
                .get()
                .await
                .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;
            let request = seeder::SuperuserRequest {
                username: username.trim().to_string(),
                email: email.trim().to_string(),
                password,
            };
            let user = seeder::create_superuser(&mut conn, &request).await?;
            println!("Superuser '{}' created.", user.username);
            Ok(())
        }
        Some(Command::Serve) | None => serve(cli.port, cli.workers, cli.database_url).await,
    }
}

/// Load configuration, letting `--database-url` stand in for the env var.
fn load_config(database_url: Option<String>) -> anyhow::Result<TrackerConfig> {
    let config = TrackerConfig::from_lookup(|key| match key {
        "DATABASE_URL" => database_url.clone().or_else(|| std::env::var(key).ok()),
        _ => std::env::var(key).ok(),
    })?;
    Ok(config)
}

async fn migrate(pool: &db::DbPool) -> anyhow::Result<()> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;
    tracing::info!("Running database migrations...");
    migration::run_migration(&mut conn).await?;
    tracing::info!("Database migrations completed.");
    Ok(())
}

async fn serve(port: u16, workers: usize, database_url: Option<String>) -> anyhow::Result<()> {
    tracing::info!("Starting Certificate Tracker...");

    let config = load_config(database_url)?;
    staticfiles::ensure_runtime_dirs(&config.statics)?;

    // Database
    let pool = db::build_pool(&config.database_url(), workers.max(1) * 4)?;
    migrate(&pool).await?;
    {
        let mut conn = pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;
        seeder::bootstrap_superuser(&mut conn).await?;
    }

    // Sessions
    let state = routes::AppState::new(pool, config);
    auth::session::spawn_vacuum_task(state.sessions.clone());

    // Initialize metrics
    metrics::init_metrics();

    let app = routes::app_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(workers, "Certificate Tracker listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["certificate-tracker"]).unwrap();
        assert_eq!(cli.port, 8000);
        assert_eq!(cli.workers, 3);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_serve_flags() {
        let cli = Cli::try_parse_from([
            "certificate-tracker",
            "--port",
            "9000",
            "--workers",
            "5",
            "serve",
        ])
        .unwrap();
        assert_eq!(cli.port, 9000);
        assert_eq!(cli.workers, 5);
        assert!(matches!(cli.command, Some(Command::Serve)));
    }

    #[test]
    fn test_cli_create_superuser() {
        let cli = Cli::try_parse_from([
            "certificate-tracker",
            "create-superuser",
            "--username",
            "registrar",
            "--password",
            "Tracker-Admin-2024",
        ])
        .unwrap();
        match cli.command {
            Some(Command::CreateSuperuser {
                username, email, ..
            }) => {
                assert_eq!(username, "registrar");
                assert_eq!(email, "");
            }
            _ => panic!("expected create-superuser"),
        }
    }
}
