//! Bootstrap and application initialization logic

use anyhow::{anyhow, Context};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::seed_default_admin;
use crate::core::config::AppConfig;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{create_conn, run_migrations, DbPool};

/// Initialize env_logger with `info` as the default filter
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub show_help: bool,
}

/// Parse command line arguments (program name already stripped)
pub fn parse_cli_args(args: &[String]) -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a path argument"))?;
                parsed.config_path = Some(PathBuf::from(path));
            }
            "--help" | "-h" => parsed.show_help = true,
            other => return Err(anyhow!("Unknown argument: {other}")),
        }
    }
    Ok(parsed)
}

pub fn usage() -> String {
    format!(
        "ticketdesk {}\n\nUSAGE:\n    ticketdesk [--config <path>]\n\nOPTIONS:\n    -c, --config <path>    Configuration file (default: ticketdesk.toml)\n    -h, --help             Print this help",
        env!("CARGO_PKG_VERSION")
    )
}

/// Connects the pool, applies migrations and seeds the first admin.
pub async fn init_database(config: &AppConfig) -> anyhow::Result<DbPool> {
    let pool = create_conn(&config.database).context("Failed to create database pool")?;
    info!(
        "Database pool ready (max {} connections)",
        config.database.max_connections
    );

    let run = config.database.run_migrations;
    let bootstrap = config.bootstrap.clone();
    let setup_pool = pool.clone();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        if run {
            run_migrations(&setup_pool).map_err(|e| anyhow!("{e}"))?;
            info!("Database migrations applied");
        }
        let mut conn = setup_pool.get()?;
        if let Some(password) = seed_default_admin(&mut conn, &bootstrap)? {
            warn!(
                "Generated password for admin '{}': {} (change it after first login)",
                bootstrap.admin_username, password
            );
        }
        Ok(())
    })
    .await??;

    Ok(pool)
}

pub async fn build_app_state(config: AppConfig) -> anyhow::Result<Arc<AppState>> {
    let pool = init_database(&config).await?;
    Ok(Arc::new(AppState::new(config, pool)))
}
