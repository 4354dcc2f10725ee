use dotenvy::dotenv;
use log::{error, info};

use ticketdesk::core::config::AppConfig;
use ticketdesk::main_module::{
    build_app_state, init_logging, parse_cli_args, run_axum_server, usage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_cli_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}\n\n{}", usage());
            std::process::exit(2);
        }
    };
    if cli.show_help {
        println!("{}", usage());
        return Ok(());
    }

    let config = AppConfig::load(cli.config_path.as_deref())?;
    info!(
        "Starting ticketdesk {} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.host,
        config.server.port
    );

    let state = match build_app_state(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize: {e:#}");
            return Err(e);
        }
    };

    run_axum_server(state).await?;
    info!("Server stopped");
    Ok(())
}
