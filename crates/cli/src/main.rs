mod config;
mod serve;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use goldi_pipeline::AnthropicClient;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::config::GoldiConfig;

/// Goldi product-ideation pipeline.
#[derive(Parser)]
#[command(name = "goldi", version, about = "Goldi product-ideation pipeline server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP JSON API server
    Serve {
        /// Port to listen on (overrides the config file and GOLDI_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Path to goldi.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    Config {
        /// Path to goldi.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Serve { port, config } => cmd_serve(port, config),
        Commands::Config { config } => cmd_config(config),
    };
    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}

fn cmd_serve(port: Option<u16>, path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = GoldiConfig::load(path.as_deref())?;
    if let Some(port) = port {
        config.server.port = port;
    }
    let api_key = config::api_key(|name| std::env::var(name).ok())?;
    let client = Arc::new(AnthropicClient::new(api_key));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(serve::start_server(config, client))
}

fn cmd_config(path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = GoldiConfig::load(path.as_deref())?;
    let api_key = match config::api_key(|name| std::env::var(name).ok()) {
        Ok(_) => "<redacted>",
        Err(_) => "<unset>",
    };
    let out = serde_json::json!({
        "server": config.server,
        "llm": {
            "model": config.llm.model,
            "max_tokens": config.llm.max_tokens,
            "api_key": api_key,
        },
        "pipeline": config.pipeline_config(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
