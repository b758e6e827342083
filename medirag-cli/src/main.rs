use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use medirag::AppConfig;
use medirag_cli::{AppState, Cli, Commands, ServerConfig, app, run_server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; variables may come from the environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init(cli.wants_json_logs(std::env::var("LOG_FORMAT").ok().as_deref()))?;

    let mut config = AppConfig::from_env().context("failed to read configuration")?;
    cli.apply(&mut config);

    match cli.command {
        Commands::Ingest { rebuild, .. } => {
            let report = app::run_ingest(&config, rebuild).await?;
            println!("{report}");
        }
        Commands::Ask { question } => {
            let service = app::build_service(&config).await?;
            let answer = service.answer(&question).await?;
            println!("{answer}");
        }
        Commands::Serve { host, port } => {
            let service = app::build_service(&config).await?;
            let state = AppState { service: Arc::new(service) };
            run_server(ServerConfig { host, port }, state).await?;
        }
    }
    Ok(())
}
