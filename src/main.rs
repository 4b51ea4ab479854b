pub mod types;
pub mod config;
pub mod data;
pub mod filter;
pub mod aggregate;
pub mod error;
pub mod server;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the catasto dataset and serve the query API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Load the dataset, report what was loaded and exit
    Check {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            info!("Serving catasto API with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let dataset = load(&app_config).await?;

            server::start_server(app_config, dataset).await?;
        }
        Commands::Check { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let dataset = load(&app_config).await?;

            if dataset.is_empty() {
                bail!("Dataset is empty, every query would report not found");
            }
            info!("Dataset OK: {} records", dataset.len());
        }
    }

    Ok(())
}

// The fetch is blocking I/O, keep it off the runtime threads.
async fn load(app_config: &config::AppConfig) -> anyhow::Result<data::Dataset> {
    let dataset_config = app_config.dataset.clone();
    tokio::task::spawn_blocking(move || data::load_dataset(&dataset_config))
        .await
        .context("Dataset loading task failed")
}
