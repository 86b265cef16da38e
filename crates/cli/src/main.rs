//! feedloom CLI entry point

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod args;
mod commands;
mod config;
mod context;

use args::{Cli, Commands};
use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level, which wins over the config file
    let log_level = match cli.log_level.clone() {
        Some(level) => level,
        None => AppConfig::load(cli.config.as_deref())
            .map(|c| c.general.log_level)
            .unwrap_or_else(|_| "info".to_string()),
    };
    init_logging(&log_level)?;

    let config_path = cli.config;
    let data_dir = cli.data_dir;

    // Execute command
    match cli.command {
        Commands::Add(args) => commands::add::execute(args, config_path, data_dir).await,
        Commands::Update(args) => commands::update::execute(args, config_path, data_dir).await,
        Commands::List(args) => commands::subscriptions::list(args, config_path, data_dir).await,
        Commands::Deactivate(args) => {
            commands::subscriptions::set_active(args, false, config_path, data_dir).await
        }
        Commands::Activate(args) => {
            commands::subscriptions::set_active(args, true, config_path, data_dir).await
        }
        Commands::Stats(args) => commands::subscriptions::stats(args, config_path, data_dir).await,
        Commands::Status => commands::status::execute(config_path, data_dir).await,
        Commands::Config(args) => commands::config::execute(args, config_path, data_dir).await,
        Commands::Doctor(args) => commands::doctor::execute(args, config_path, data_dir).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}
